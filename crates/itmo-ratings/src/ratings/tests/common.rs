use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::ratings::domain::{Entry, ProgramDirection};
use crate::ratings::scraper::{ProgramPage, RatingSource};
use crate::ratings::{
    CacheConfig, ExtractionError, Notifier, NotifyError, RatingCache, RatingsError,
    UpstreamError,
};

pub(super) fn entry(student_id: &str, position: u32, priority: u32) -> Entry {
    Entry {
        student_id: student_id.to_string(),
        position,
        priority,
        total_scores: 90.0 - f64::from(position),
        exam_scores: 80.0,
        diploma_average: 4.7,
        achievement_scores: 3.0,
        agreement_submitted: false,
        case_number: format!("M-{student_id}-{position}"),
        contest: Some("general".to_string()),
        exam_type: None,
        status: None,
        main_top_priority: false,
        highest_passing_priority: false,
        special_category: None,
        detailed_target_quota: None,
        target_achievements: None,
        approved_contract: None,
        offer_number: None,
        snils: None,
        link: None,
        published_in_work_in_russia: None,
    }
}

pub(super) fn program(competitive_group_id: i64, title: &str) -> ProgramDirection {
    ProgramDirection {
        title: title.to_string(),
        budget_seats: 20,
        contract_seats: 10,
        target_quota_seats: 2,
        isu_id: None,
        disability_quota_seats: 1,
        special_quota: 1,
        competitive_group_id,
    }
}

pub(super) fn updated_at() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3 * 3600)
        .expect("offset")
        .with_ymd_and_hms(2025, 8, 1, 10, 15, 0)
        .single()
        .expect("timestamp")
}

/// In-memory portal with switchable failures and an optional pause inside page fetches.
#[derive(Default)]
pub(super) struct FakeSource {
    programs: Mutex<Vec<ProgramDirection>>,
    pages: Mutex<HashMap<i64, Vec<Entry>>>,
    failing_programs: Mutex<HashSet<i64>>,
    catalog_fails: AtomicBool,
    hold_pages: AtomicBool,
    page_entered: Notify,
    page_release: Notify,
    catalog_calls: AtomicUsize,
    page_calls: AtomicUsize,
}

impl FakeSource {
    pub(super) fn with_program(self, program: ProgramDirection, entries: Vec<Entry>) -> Self {
        self.set_page(program.competitive_group_id, entries);
        self.programs.lock().expect("programs lock").push(program);
        self
    }

    pub(super) fn set_page(&self, program_id: i64, entries: Vec<Entry>) {
        self.pages
            .lock()
            .expect("pages lock")
            .insert(program_id, entries);
    }

    pub(super) fn fail_program(&self, program_id: i64) {
        self.failing_programs
            .lock()
            .expect("failing lock")
            .insert(program_id);
    }

    pub(super) fn fail_catalog(&self, fails: bool) {
        self.catalog_fails.store(fails, Ordering::SeqCst);
    }

    /// Makes page fetches wait for [`release_pages`](Self::release_pages).
    pub(super) fn hold_pages(&self, hold: bool) {
        self.hold_pages.store(hold, Ordering::SeqCst);
    }

    pub(super) fn release_pages(&self) {
        self.hold_pages.store(false, Ordering::SeqCst);
        self.page_release.notify_waiters();
    }

    pub(super) async fn page_entered(&self) {
        self.page_entered.notified().await;
    }

    pub(super) fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    pub(super) fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RatingSource for FakeSource {
    async fn fetch_catalog(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProgramDirection>, RatingsError> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(RatingsError::Cancelled);
        }
        if self.catalog_fails.load(Ordering::SeqCst) {
            return Err(UpstreamError::Status {
                status: 503,
                url: "fake://catalog".to_string(),
            }
            .into());
        }
        Ok(self.programs.lock().expect("programs lock").clone())
    }

    async fn fetch_entries(
        &self,
        cancel: &CancellationToken,
        program_id: i64,
    ) -> Result<ProgramPage, RatingsError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);

        if self.hold_pages.load(Ordering::SeqCst) {
            let released = self.page_release.notified();
            self.page_entered.notify_one();
            tokio::select! {
                _ = cancel.cancelled() => return Err(RatingsError::Cancelled),
                _ = released => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(RatingsError::Cancelled);
        }

        if self
            .failing_programs
            .lock()
            .expect("failing lock")
            .contains(&program_id)
        {
            return Err(ExtractionError::MarkerMissing.into());
        }

        let entries = self
            .pages
            .lock()
            .expect("pages lock")
            .get(&program_id)
            .cloned()
            .unwrap_or_default();
        Ok(ProgramPage {
            entries,
            updated_at: updated_at(),
        })
    }
}

/// Three programs; `4410002` appears only in the second one.
pub(super) fn three_program_source() -> FakeSource {
    FakeSource::default()
        .with_program(
            program(101, "Data Science"),
            vec![entry("4410001", 1, 2), entry("4410003", 2, 1)],
        )
        .with_program(
            program(102, "Robotics"),
            vec![entry("4410002", 1, 1), entry("4410003", 2, 3)],
        )
        .with_program(
            program(103, "Software Engineering"),
            vec![entry("4410003", 5, 2), entry("4410001", 7, 1)],
        )
}

pub(super) fn cache_with(source: FakeSource) -> Arc<RatingCache<FakeSource>> {
    Arc::new(RatingCache::new(
        source,
        CacheConfig {
            fetch_concurrency: 2,
        },
    ))
}

/// Records delivered messages instead of sending them.
#[derive(Default)]
pub(super) struct RecordingNotifier {
    pub(super) sent: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, user_id: i64, text: &str) -> Result<(), NotifyError> {
        crate::ratings::notifier::validate_message(user_id, text)?;
        self.sent
            .lock()
            .expect("sent lock")
            .push((user_id, text.to_string()));
        Ok(())
    }
}
