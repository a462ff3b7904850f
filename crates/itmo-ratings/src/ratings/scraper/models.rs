use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ratings::domain::{Entry, ProgramDirection};

/// Catalog API envelope: `{ok, message, result: {items}}`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ProgramsEnvelope {
    pub(crate) ok: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) result: Option<ProgramsResult>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ProgramsResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) items: Vec<ProgramDirection>,
}

/// Shape of the `__NEXT_DATA__` payload embedded in a program page.
#[derive(Debug, Deserialize)]
pub(crate) struct NextData {
    pub(crate) props: NextProps,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NextProps {
    #[serde(rename = "pageProps")]
    pub(crate) page_props: PageProps,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageProps {
    #[serde(rename = "programList")]
    pub(crate) program_list: ProgramList,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProgramList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) general_competition: Vec<RawEntry>,
    #[serde(default, deserialize_with = "deserialize_update_time")]
    pub(crate) update_time: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct RawEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    sspvo_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    position: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    priority: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    total_scores: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    exam_scores: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    diploma_average: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    ia_scores: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    is_send_agreement: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    case_number: String,
    #[serde(default)]
    contest: Option<String>,
    #[serde(default)]
    exam_type: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    main_top_priority: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    highest_passageway_priority: bool,
    #[serde(default)]
    is_special_b_category: Option<bool>,
    #[serde(default)]
    is_detailed_target_quota: Option<bool>,
    #[serde(default)]
    target_achievements: Option<f64>,
    #[serde(default)]
    has_approved_contract: Option<bool>,
    #[serde(default)]
    offer_number: Option<String>,
    #[serde(default)]
    snils: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    is_published_in_work_in_russia: Option<bool>,
}

impl From<RawEntry> for Entry {
    fn from(raw: RawEntry) -> Self {
        Entry {
            student_id: raw.sspvo_id,
            position: raw.position,
            priority: raw.priority,
            total_scores: raw.total_scores,
            exam_scores: raw.exam_scores,
            diploma_average: raw.diploma_average,
            achievement_scores: raw.ia_scores,
            agreement_submitted: raw.is_send_agreement,
            case_number: raw.case_number,
            contest: raw.contest.filter(|value| !value.is_empty()),
            exam_type: raw.exam_type.filter(|value| !value.is_empty()),
            status: raw.status.filter(|value| !value.is_empty()),
            main_top_priority: raw.main_top_priority,
            highest_passing_priority: raw.highest_passageway_priority,
            special_category: raw.is_special_b_category,
            detailed_target_quota: raw.is_detailed_target_quota,
            target_achievements: raw.target_achievements,
            approved_contract: raw.has_approved_contract,
            offer_number: raw.offer_number.filter(|value| !value.is_empty()),
            snils: raw.snils.filter(|value| !value.is_empty()),
            link: raw.link.filter(|value| !value.is_empty()),
            published_in_work_in_russia: raw.is_published_in_work_in_russia,
        }
    }
}

/// Treats an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let opt = Option::<T>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Portal timestamps without an offset are Moscow local time.
const PORTAL_OFFSET_SECS: i32 = 3 * 3600;

fn deserialize_update_time<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.filter(|value| !value.trim().is_empty())
        .map(|value| parse_update_time(&value).map_err(serde::de::Error::custom))
        .transpose()
}

pub(crate) fn parse_update_time(value: &str) -> Result<DateTime<FixedOffset>, String> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt);
    }

    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|err| format!("unrecognized update_time '{trimmed}' ({err})"))?;

    let offset = FixedOffset::east_opt(PORTAL_OFFSET_SECS)
        .ok_or_else(|| "invalid portal offset".to_string())?;
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| format!("ambiguous update_time '{trimmed}'"))
}
