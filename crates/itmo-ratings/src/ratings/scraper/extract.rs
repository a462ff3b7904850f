use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;

use super::models::{NextData, ProgramsEnvelope};
use crate::ratings::domain::{Entry, ProgramDirection};
use crate::ratings::{ExtractionError, UpstreamError};

fn next_data_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<script id="__NEXT_DATA__" type="application/json">(.*?)</script>"#)
            .expect("__NEXT_DATA__ pattern is valid")
    })
}

/// Entries and the portal's own update stamp decoded from one program page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub entries: Vec<Entry>,
    pub updated_at: Option<DateTime<FixedOffset>>,
}

/// Pulls the general-competition list out of a rendered program page.
pub fn extract_entries(html: &str) -> Result<ExtractedPage, ExtractionError> {
    let payload = next_data_pattern()
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str().trim())
        .ok_or(ExtractionError::MarkerMissing)?;

    let data: NextData = serde_json::from_str(payload).map_err(ExtractionError::Decode)?;
    let list = data.props.page_props.program_list;

    Ok(ExtractedPage {
        entries: list
            .general_competition
            .into_iter()
            .map(Entry::from)
            .collect(),
        updated_at: list.update_time,
    })
}

/// Decodes the catalog API envelope, failing when the portal reports `ok=false`.
pub fn parse_catalog(body: &[u8]) -> Result<Vec<ProgramDirection>, UpstreamError> {
    let envelope: ProgramsEnvelope = serde_json::from_slice(body).map_err(UpstreamError::Decode)?;

    if !envelope.ok {
        return Err(UpstreamError::Rejected {
            message: envelope.message,
        });
    }

    Ok(envelope.result.unwrap_or_default().items)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::ratings::scraper::models::ProgramsResult;

    fn sample_page() -> String {
        let entries = [
            raw_entry("4410001", 1, 2),
            raw_entry("4410002", 2, 1),
            raw_entry("4410003", 3, 1),
        ]
        .join(",");
        program_page(&next_data(&entries, "\"2025-08-01T10:15:00+03:00\""))
    }

    #[test]
    fn extracts_general_competition_in_page_order() {
        let page = extract_entries(&sample_page()).expect("page decodes");
        let ids: Vec<&str> = page
            .entries
            .iter()
            .map(|entry| entry.student_id.as_str())
            .collect();
        assert_eq!(ids, vec!["4410001", "4410002", "4410003"]);
        assert_eq!(page.entries[0].priority, 2);
        assert_eq!(page.entries[0].contest.as_deref(), Some("general"));
        assert!(page.entries[0].exam_type.is_none());
        assert!(page.entries[0].highest_passing_priority);
        assert!(page.updated_at.is_some());
    }

    #[test]
    fn identical_markup_yields_identical_entries() {
        let html = sample_page();
        let first = extract_entries(&html).expect("first pass");
        let second = extract_entries(&html).expect("second pass");
        assert_eq!(first, second);
    }

    #[test]
    fn payload_spanning_lines_is_found() {
        let entries = raw_entry("4410001", 1, 1);
        let payload = next_data(&entries, "null").replace(",\"page\"", ",\n  \"page\"");
        let page = extract_entries(&program_page(&format!("\n{payload}\n"))).expect("decodes");
        assert_eq!(page.entries.len(), 1);
        assert!(page.updated_at.is_none());
    }

    #[test]
    fn missing_marker_is_reported() {
        let html = "<html><body><script id=\"other\">{}</script></body></html>";
        assert!(matches!(
            extract_entries(html),
            Err(ExtractionError::MarkerMissing)
        ));
    }

    #[test]
    fn malformed_payload_is_reported() {
        let html = program_page("{\"props\": {\"pageProps\": ");
        assert!(matches!(
            extract_entries(&html),
            Err(ExtractionError::Decode(_))
        ));
    }

    fn program(id: i64, title: &str) -> ProgramDirection {
        ProgramDirection {
            title: title.to_string(),
            budget_seats: 25,
            contract_seats: 15,
            target_quota_seats: 3,
            isu_id: Some(id * 10),
            disability_quota_seats: 2,
            special_quota: 1,
            competitive_group_id: id,
        }
    }

    #[test]
    fn catalog_envelope_preserves_every_program() {
        let programs = vec![
            program(1651, "Software Engineering"),
            program(1652, "Data Science"),
            program(1653, "Robotics"),
        ];
        let body = serde_json::to_vec(&ProgramsEnvelope {
            ok: true,
            message: String::new(),
            result: Some(ProgramsResult {
                items: programs.clone(),
            }),
        })
        .expect("encodes");

        let decoded = parse_catalog(&body).expect("decodes");
        assert_eq!(decoded, programs);
    }

    #[test]
    fn catalog_rejection_surfaces_message() {
        let body = br#"{"ok":false,"message":"rate limited","result":null}"#;
        match parse_catalog(body) {
            Err(UpstreamError::Rejected { message }) => assert_eq!(message, "rate limited"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn catalog_garbage_is_a_decode_error() {
        assert!(matches!(
            parse_catalog(b"<html>blocked</html>"),
            Err(UpstreamError::Decode(_))
        ));
    }

    #[test]
    fn catalog_null_counts_default_to_zero() {
        let body = br#"{"ok":true,"message":"","result":{"items":[{"direction_title":"Robotics","budget_min":null,"contract":null,"target_reception":null,"isu_id":null,"invalid":null,"special_quota":null,"competitive_group_id":7}]}}"#;
        let decoded = parse_catalog(body).expect("decodes");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].budget_seats, 0);
        assert_eq!(decoded[0].competitive_group_id, 7);
    }
}
