//! CSV table layer for tickets and KB articles.
//!
//! All three output tables (tickets, annotated tickets, KB articles) are
//! append-only CSV files with the header written exactly once at open.
//! Rows are flushed incrementally so a mid-run crash loses at most the
//! batch in flight; consumers must treat the files as streaming-appendable.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use ticketforge_shared::{KbArticle, Result, TicketForgeError, TicketRecord};

/// Ticket table column order; must match the field order of [`TicketRecord`].
const TICKET_COLUMNS: [&str; 26] = [
    "ticket_id",
    "title",
    "description",
    "created_at",
    "impact",
    "urgency",
    "priority_level",
    "priority",
    "status",
    "category",
    "service",
    "category_path",
    "ci_id",
    "os",
    "hostname",
    "reporter",
    "assigned_group",
    "assignee",
    "site",
    "conversation_history",
    "comments_count",
    "error_code",
    "kb_article_id",
    "resolution_note",
    "issue_type",
    "ticket_fulltext",
];

/// KB table column order.
const KB_COLUMNS: [&str; 14] = [
    "kb_id",
    "title",
    "category",
    "service",
    "issue_type",
    "error_codes",
    "environment",
    "problem",
    "symptoms",
    "root_cause",
    "resolution_steps",
    "validation",
    "related_ticket_ids",
    "kb_fulltext",
];

/// Separator for list-valued KB columns.
const LIST_SEPARATOR: &str = " | ";

// ---------------------------------------------------------------------------
// TicketTable
// ---------------------------------------------------------------------------

/// Writer handle for a ticket CSV (the generated table or the annotated copy).
pub struct TicketTable {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl TicketTable {
    /// Open `path` for appending, writing the header only when the file is
    /// new or empty.
    pub fn append_to(path: &Path) -> Result<Self> {
        ensure_parent(path)?;

        let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| TicketForgeError::io(path, e))?;

        let mut table = Self {
            writer: csv_writer(file),
            path: path.to_path_buf(),
        };
        if is_new {
            table.write_header()?;
            debug!(path = %table.path.display(), "ticket table header written");
        }
        Ok(table)
    }

    /// Create `path`, truncating any previous content, and write the header.
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent(path)?;

        let file = File::create(path).map_err(|e| TicketForgeError::io(path, e))?;
        let mut table = Self {
            writer: csv_writer(file),
            path: path.to_path_buf(),
        };
        table.write_header()?;
        Ok(table)
    }

    fn write_header(&mut self) -> Result<()> {
        self.writer
            .write_record(TICKET_COLUMNS)
            .map_err(|e| TicketForgeError::Storage(e.to_string()))?;
        self.flush()
    }

    /// Append one ticket row.
    pub fn append(&mut self, ticket: &TicketRecord) -> Result<()> {
        self.writer
            .serialize(ticket)
            .map_err(|e| TicketForgeError::Storage(e.to_string()))
    }

    /// Flush buffered rows to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| TicketForgeError::io(&self.path, e))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read all ticket rows from a CSV written by [`TicketTable`].
pub fn read_tickets(path: &Path) -> Result<Vec<TicketRecord>> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| TicketForgeError::Storage(e.to_string()))?;

    let mut tickets = Vec::new();
    for row in reader.deserialize() {
        let ticket: TicketRecord =
            row.map_err(|e| TicketForgeError::Storage(format!("bad ticket row: {e}")))?;
        tickets.push(ticket);
    }
    Ok(tickets)
}

// ---------------------------------------------------------------------------
// KbTable
// ---------------------------------------------------------------------------

/// Writer handle for the KB article CSV.
pub struct KbTable {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl KbTable {
    /// Create `path`, truncating any previous content, and write the header.
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent(path)?;

        let file = File::create(path).map_err(|e| TicketForgeError::io(path, e))?;
        let mut table = Self {
            writer: csv_writer(file),
            path: path.to_path_buf(),
        };
        table
            .writer
            .write_record(KB_COLUMNS)
            .map_err(|e| TicketForgeError::Storage(e.to_string()))?;
        table.flush()?;
        Ok(table)
    }

    /// Append one article row. List columns are joined with `" | "`.
    pub fn append(&mut self, article: &KbArticle) -> Result<()> {
        let error_codes = article.error_codes.join(LIST_SEPARATOR);
        let symptoms = article.symptoms.join(LIST_SEPARATOR);
        let root_causes = article.root_causes.join(LIST_SEPARATOR);
        let resolution_steps = article.resolution_steps.join(LIST_SEPARATOR);
        let related_ids = article.related_ticket_ids.join(LIST_SEPARATOR);

        self.writer
            .write_record([
                article.kb_id.as_str(),
                article.title.as_str(),
                article.category.as_str(),
                article.service.as_str(),
                article.issue_type.as_str(),
                error_codes.as_str(),
                article.environment.as_str(),
                article.problem.as_str(),
                symptoms.as_str(),
                root_causes.as_str(),
                resolution_steps.as_str(),
                article.validation.as_str(),
                related_ids.as_str(),
                article.kb_fulltext.as_str(),
            ])
            .map_err(|e| TicketForgeError::Storage(e.to_string()))
    }

    /// Flush buffered rows to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| TicketForgeError::io(&self.path, e))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn csv_writer(file: File) -> csv::Writer<File> {
    // Headers are written explicitly at open, not per-record.
    csv::WriterBuilder::new().has_headers(false).from_writer(file)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| TicketForgeError::io(parent, e))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
