//! Representative ticket selection for consolidation prompts.

use rand::Rng;
use rand::seq::SliceRandom;

use ticketforge_shared::TicketRecord;

/// Pick up to `max_n` representative tickets from a group.
///
/// Groups within the cap pass through unchanged. Larger groups are sorted
/// by `(impact, urgency, ticket_id)` and covered by four boundary picks
/// (first, one-third, two-thirds, last), with the remaining slots filled
/// by a uniform random sample of the rest. Boundary selection guarantees
/// coverage of the severity extremes and midpoints; the random fill adds
/// diversity without needing a similarity metric.
///
/// The random source is injected so sampling is reproducible per call.
pub fn representative_subset<'a>(
    group: &'a [TicketRecord],
    max_n: usize,
    rng: &mut impl Rng,
) -> Vec<&'a TicketRecord> {
    if group.len() <= max_n {
        return group.iter().collect();
    }

    let mut sorted: Vec<&TicketRecord> = group.iter().collect();
    sorted.sort_by(|a, b| {
        (a.impact, a.urgency, &a.ticket_id).cmp(&(b.impact, b.urgency, &b.ticket_id))
    });

    let n = sorted.len();
    let boundaries = [0, n / 3, (2 * n) / 3, n - 1];

    let mut picked: Vec<usize> = Vec::with_capacity(4);
    for idx in boundaries {
        if !picked.contains(&idx) {
            picked.push(idx);
        }
    }
    picked.truncate(max_n);

    let mut subset: Vec<&TicketRecord> = picked.iter().map(|&i| sorted[i]).collect();

    let mut remainder: Vec<&TicketRecord> = sorted
        .iter()
        .enumerate()
        .filter(|(i, _)| !picked.contains(i))
        .map(|(_, t)| *t)
        .collect();
    remainder.shuffle(rng);
    subset.extend(remainder.into_iter().take(max_n - subset.len()));

    subset
}
