use super::summary::StudentSummary;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("summary for student {student_id} has no rows")]
    EmptySummary { student_id: String },
}

/// Renders a summary as Markdown text, one block per program.
pub fn render_summary(summary: &StudentSummary) -> Result<String, FormatError> {
    if summary.is_empty() {
        return Err(FormatError::EmptySummary {
            student_id: summary.student_id.clone(),
        });
    }

    let mut out = String::new();
    for row in &summary.rows {
        out.push_str(&format!(
            "\nPriority: {}\nProgram: {}\nPosition: {} / {} (applications submitted: {})\nLower-priority applicants ahead: {}\nLast update: {}\n",
            row.priority,
            row.program_link,
            row.position,
            row.budget_seats,
            row.total_applicants,
            row.lower_priority_ahead,
            row.last_update,
        ));
    }

    Ok(out)
}
