use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::scraper::models::null_as_default;

/// Static metadata of one admission program as published in the catalog.
///
/// Field names follow the catalog API so the same type decodes the wire envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDirection {
    #[serde(rename = "direction_title")]
    pub title: String,
    #[serde(rename = "budget_min", default, deserialize_with = "null_as_default")]
    pub budget_seats: u32,
    #[serde(rename = "contract", default, deserialize_with = "null_as_default")]
    pub contract_seats: u32,
    #[serde(rename = "target_reception", default, deserialize_with = "null_as_default")]
    pub target_quota_seats: u32,
    #[serde(default)]
    pub isu_id: Option<i64>,
    #[serde(rename = "invalid", default, deserialize_with = "null_as_default")]
    pub disability_quota_seats: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub special_quota: u32,
    pub competitive_group_id: i64,
}

/// One applicant's row within one program's ranking list.
///
/// Flags the portal may omit stay `None`; textual attributes the portal sends as `null`
/// are kept as `None` rather than empty strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub student_id: String,
    pub position: u32,
    pub priority: u32,
    pub total_scores: f64,
    pub exam_scores: f64,
    pub diploma_average: f64,
    pub achievement_scores: f64,
    pub agreement_submitted: bool,
    pub case_number: String,
    pub contest: Option<String>,
    pub exam_type: Option<String>,
    pub status: Option<String>,
    pub main_top_priority: bool,
    pub highest_passing_priority: bool,
    pub special_category: Option<bool>,
    pub detailed_target_quota: Option<bool>,
    pub target_achievements: Option<f64>,
    pub approved_contract: Option<bool>,
    pub offer_number: Option<String>,
    pub snils: Option<String>,
    pub link: Option<String>,
    pub published_in_work_in_russia: Option<bool>,
}

/// Immutable capture of one program's ranking list for a single refresh cycle.
#[derive(Debug, Clone)]
pub struct ProgramSnapshot {
    pub program: ProgramDirection,
    pub entries: Vec<Entry>,
    pub updated_at: DateTime<FixedOffset>,
}

impl ProgramSnapshot {
    pub fn program_id(&self) -> i64 {
        self.program.competitive_group_id
    }
}

/// Reverse-index row: an applicant's entry together with the snapshot that owns it.
#[derive(Debug, Clone)]
pub struct IndexRow {
    snapshot: Arc<ProgramSnapshot>,
    offset: usize,
}

impl IndexRow {
    pub(crate) fn new(snapshot: Arc<ProgramSnapshot>, offset: usize) -> Self {
        debug_assert!(offset < snapshot.entries.len());
        Self { snapshot, offset }
    }

    pub fn entry(&self) -> &Entry {
        &self.snapshot.entries[self.offset]
    }

    pub fn snapshot(&self) -> &ProgramSnapshot {
        &self.snapshot
    }
}
