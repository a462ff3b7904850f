use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::domain::IndexRow;
use super::scraper::{program_url, PROGRAM_PAGE_URL_TEMPLATE};

pub const TIMESTAMP_FORMAT: &str = "%d %b %y %H:%M %z";

/// One program line of an applicant's standing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub program_id: i64,
    pub title: String,
    pub priority: u32,
    pub program_link: String,
    pub position: u32,
    pub budget_seats: u32,
    pub total_applicants: usize,
    /// Applicants in this program who rank it lower than this applicant does but sit higher.
    pub lower_priority_ahead: usize,
    pub last_update: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub student_id: String,
    pub rows: Vec<SummaryRow>,
}

impl StudentSummary {
    /// Keeps only the row for `program_id`.
    pub fn for_program(mut self, program_id: i64) -> Self {
        self.rows.retain(|row| row.program_id == program_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Derives the per-program standing for one applicant, ordered by priority.
///
/// Rows with equal priority keep the order they have in `rows`.
pub fn build_summary(student_id: &str, rows: &[IndexRow]) -> StudentSummary {
    let mut summary_rows: Vec<SummaryRow> = rows.iter().map(summarize_row).collect();
    summary_rows.sort_by_key(|row| row.priority);

    StudentSummary {
        student_id: student_id.to_string(),
        rows: summary_rows,
    }
}

fn summarize_row(row: &IndexRow) -> SummaryRow {
    let snapshot = row.snapshot();
    let entry = row.entry();
    let program = &snapshot.program;

    let lower_priority_ahead = snapshot
        .entries
        .iter()
        .filter(|other| other.priority > entry.priority && other.position < entry.position)
        .count();

    SummaryRow {
        program_id: program.competitive_group_id,
        title: program.title.clone(),
        priority: entry.priority,
        program_link: program_link(&program.title, program.competitive_group_id),
        position: entry.position,
        budget_seats: program.budget_seats,
        total_applicants: snapshot.entries.len(),
        lower_priority_ahead,
        last_update: format_timestamp(&snapshot.updated_at),
    }
}

/// Markdown link to the program's public rating page.
pub fn program_link(title: &str, program_id: i64) -> String {
    format!(
        "[{title}]({})",
        program_url(PROGRAM_PAGE_URL_TEMPLATE, program_id)
    )
}

pub fn format_timestamp(at: &DateTime<FixedOffset>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
