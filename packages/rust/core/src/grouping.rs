//! Partitioning tickets into problem clusters.

use std::collections::BTreeMap;

use ticketforge_shared::{GroupKey, TicketRecord};

/// Group tickets by their derived [`GroupKey`].
///
/// Total and stable: every ticket lands in exactly one group, insertion
/// order is preserved within each group, and the `BTreeMap` gives a
/// deterministic iteration order across groups.
pub fn group_by_key(tickets: Vec<TicketRecord>) -> BTreeMap<GroupKey, Vec<TicketRecord>> {
    let mut groups: BTreeMap<GroupKey, Vec<TicketRecord>> = BTreeMap::new();
    for ticket in tickets {
        groups
            .entry(GroupKey::for_ticket(&ticket))
            .or_default()
            .push(ticket);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(id: &str, category: &str, service: &str, issue: &str, code: &str) -> TicketRecord {
        TicketRecord {
            ticket_id: id.into(),
            category: category.into(),
            service: service.into(),
            issue_type: issue.into(),
            error_code: code.into(),
            ..Default::default()
        }
    }

    #[test]
    fn every_ticket_lands_in_exactly_one_group() {
        let tickets = vec![
            ticket("T-1", "Network", "VPN", "Timeout", "503"),
            ticket("T-2", "Network", "VPN", "Timeout", "503"),
            ticket("T-3", "Network", "DNS", "Timeout", ""),
            ticket("T-4", "Access", "SSO", "AuthenticationError", ""),
        ];

        let groups = group_by_key(tickets);
        assert_eq!(groups.len(), 3);
        let total: usize = groups.values().map(Vec::len).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn missing_fields_group_together() {
        let tickets = vec![
            ticket("T-1", "", "", "", ""),
            ticket("T-2", "", "", "", ""),
        ];
        let groups = group_by_key(tickets);
        assert_eq!(groups.len(), 1);
        let key = groups.keys().next().unwrap();
        assert_eq!(key.to_string(), "|||NONE");
    }

    #[test]
    fn insertion_order_preserved_within_groups() {
        let tickets = vec![
            ticket("T-3", "Network", "VPN", "Timeout", "503"),
            ticket("T-1", "Network", "VPN", "Timeout", "503"),
            ticket("T-2", "Network", "VPN", "Timeout", "503"),
        ];
        let groups = group_by_key(tickets);
        let ids: Vec<&str> = groups
            .values()
            .next()
            .unwrap()
            .iter()
            .map(|t| t.ticket_id.as_str())
            .collect();
        assert_eq!(ids, ["T-3", "T-1", "T-2"]);
    }

    #[test]
    fn regrouping_the_union_is_idempotent() {
        let tickets = vec![
            ticket("T-1", "Network", "VPN", "Timeout", "503"),
            ticket("T-2", "Network", "DNS", "Timeout", ""),
            ticket("T-3", "Access", "SSO", "AuthenticationError", "0x80070005"),
            ticket("T-4", "Network", "VPN", "Timeout", "503"),
        ];

        let first = group_by_key(tickets);
        let union: Vec<TicketRecord> = first.values().flatten().cloned().collect();
        let second = group_by_key(union);
        assert_eq!(first, second);
    }
}
