use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::domain::{IndexRow, ProgramSnapshot};
use super::scraper::RatingSource;
use super::summary::{build_summary, StudentSummary};
use super::RatingsError;

/// Tuning for one refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Program pages fetched in parallel during a refresh.
    pub fetch_concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: 4,
        }
    }
}

/// One published generation: every program that loaded plus the applicant reverse index.
#[derive(Debug)]
pub struct RatingIndex {
    generation: u64,
    built_at: DateTime<Utc>,
    programs: HashMap<i64, Arc<ProgramSnapshot>>,
    students: HashMap<String, Vec<IndexRow>>,
}

impl RatingIndex {
    /// Indexes `snapshots` in the given order; rows for one applicant follow program order.
    pub fn build(generation: u64, built_at: DateTime<Utc>, snapshots: Vec<ProgramSnapshot>) -> Self {
        let mut programs = HashMap::with_capacity(snapshots.len());
        let mut students: HashMap<String, Vec<IndexRow>> = HashMap::new();

        for snapshot in snapshots {
            let program_id = snapshot.program_id();
            if programs.contains_key(&program_id) {
                warn!(program_id, "duplicate competitive group in catalog, keeping first");
                continue;
            }

            let snapshot = Arc::new(snapshot);
            for (offset, entry) in snapshot.entries.iter().enumerate() {
                students
                    .entry(entry.student_id.clone())
                    .or_default()
                    .push(IndexRow::new(Arc::clone(&snapshot), offset));
            }
            programs.insert(program_id, snapshot);
        }

        Self {
            generation,
            built_at,
            programs,
            students,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn program(&self, program_id: i64) -> Option<&ProgramSnapshot> {
        self.programs.get(&program_id).map(Arc::as_ref)
    }

    pub fn rows(&self, student_id: &str) -> Option<&[IndexRow]> {
        self.students.get(student_id).map(Vec::as_slice)
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn student_count(&self) -> usize {
        self.students.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Empty,
    Ready {
        generation: u64,
        programs: usize,
        students: usize,
        built_at: DateTime<Utc>,
    },
}

/// Outcome of a refresh that reached publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub generation: u64,
    pub programs_total: usize,
    pub programs_loaded: usize,
    pub failed_programs: Vec<i64>,
    pub students: usize,
    pub elapsed: Duration,
}

/// Periodically rebuilt, atomically swapped rating index.
///
/// Readers clone the published `Arc` under a short read lock and work on it outside the lock,
/// so a slow rebuild never blocks a lookup. Rebuilds are serialised by `refresh_gate`.
pub struct RatingCache<S> {
    source: S,
    config: CacheConfig,
    published: RwLock<Option<Arc<RatingIndex>>>,
    refresh_gate: Mutex<()>,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

impl<S> RatingCache<S>
where
    S: RatingSource,
{
    pub fn new(source: S, config: CacheConfig) -> Self {
        Self {
            source,
            config,
            published: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Currently published generation, if any refresh has ever completed.
    pub fn current(&self) -> Option<Arc<RatingIndex>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> CacheStatus {
        match self.current() {
            None => CacheStatus::Empty,
            Some(index) => CacheStatus::Ready {
                generation: index.generation(),
                programs: index.program_count(),
                students: index.student_count(),
                built_at: index.built_at(),
            },
        }
    }

    /// Rebuilds the index, waiting for any refresh already in progress to finish first.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<RefreshReport, RatingsError> {
        let _gate = self.refresh_gate.lock().await;
        let (report, _) = self.rebuild(cancel).await?;
        Ok(report)
    }

    /// Like [`refresh`](Self::refresh) but returns `None` instead of waiting when another
    /// refresh holds the gate.
    pub async fn refresh_if_idle(
        &self,
        cancel: &CancellationToken,
    ) -> Option<Result<RefreshReport, RatingsError>> {
        let _gate = self.refresh_gate.try_lock().ok()?;
        Some(self.rebuild(cancel).await.map(|(report, _)| report))
    }

    /// Every row the applicant has across the published programs.
    ///
    /// Bootstraps synchronously when nothing has been published yet; a failed or cancelled
    /// bootstrap surfaces as [`RatingsError::Unavailable`].
    pub async fn lookup(
        &self,
        cancel: &CancellationToken,
        student_id: &str,
    ) -> Result<Vec<IndexRow>, RatingsError> {
        let index = self.published_or_bootstrap(cancel).await?;
        match index.rows(student_id) {
            Some(rows) if !rows.is_empty() => Ok(rows.to_vec()),
            _ => Err(RatingsError::NotFound {
                student_id: student_id.to_string(),
            }),
        }
    }

    pub async fn summary(
        &self,
        cancel: &CancellationToken,
        student_id: &str,
    ) -> Result<StudentSummary, RatingsError> {
        let rows = self.lookup(cancel, student_id).await?;
        Ok(build_summary(student_id, &rows))
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Stops the refresh loop and aborts in-flight fetches started from this cache's token.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn published_or_bootstrap(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<RatingIndex>, RatingsError> {
        if let Some(index) = self.current() {
            return Ok(index);
        }

        let _gate = self.refresh_gate.lock().await;
        // A concurrent bootstrap may have published while we waited on the gate.
        if let Some(index) = self.current() {
            return Ok(index);
        }

        debug!("rating index empty, bootstrapping on demand");
        self.rebuild(cancel)
            .await
            .map(|(_, index)| index)
            .map_err(|error| RatingsError::Unavailable(Box::new(error)))
    }

    /// Fetches everything and publishes a new generation. Callers must hold `refresh_gate`.
    async fn rebuild(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(RefreshReport, Arc<RatingIndex>), RatingsError> {
        let started = Instant::now();
        let catalog = self.source.fetch_catalog(cancel).await?;
        let programs_total = catalog.len();

        let source = &self.source;
        let mut pages = stream::iter(catalog)
            .map(move |program| async move {
                let outcome = source
                    .fetch_entries(cancel, program.competitive_group_id)
                    .await;
                (program, outcome)
            })
            .buffered(self.config.fetch_concurrency.max(1));

        let mut snapshots = Vec::with_capacity(programs_total);
        let mut failed_programs = Vec::new();
        while let Some((program, outcome)) = pages.next().await {
            let program_id = program.competitive_group_id;
            match outcome {
                Ok(page) => snapshots.push(ProgramSnapshot {
                    program,
                    entries: page.entries,
                    updated_at: page.updated_at,
                }),
                Err(RatingsError::Cancelled) => {
                    info!(program_id, "refresh cancelled, keeping previous index");
                    return Err(RatingsError::Cancelled);
                }
                Err(error) => {
                    warn!(program_id, error = %error, "skipping program for this refresh");
                    failed_programs.push(program_id);
                }
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let index = Arc::new(RatingIndex::build(generation, Utc::now(), snapshots));
        self.publish(Arc::clone(&index));

        let report = RefreshReport {
            generation,
            programs_total,
            programs_loaded: index.program_count(),
            failed_programs,
            students: index.student_count(),
            elapsed: started.elapsed(),
        };
        info!(
            generation,
            programs = report.programs_loaded,
            failed = report.failed_programs.len(),
            students = report.students,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "rating index published"
        );

        Ok((report, index))
    }

    fn publish(&self, index: Arc<RatingIndex>) {
        let mut published = self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *published = Some(index);
    }
}

impl<S> RatingCache<S>
where
    S: RatingSource + 'static,
{
    /// Refreshes every `period` until [`shutdown`](Self::shutdown). The first tick fires
    /// immediately; ticks that land while a refresh is running are skipped.
    pub fn spawn_refresh_loop(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match self.refresh_if_idle(&self.shutdown).await {
                    None => debug!("refresh already running, skipping tick"),
                    Some(Ok(_)) | Some(Err(RatingsError::Cancelled)) => {}
                    Some(Err(error)) => error!(error = %error, "scheduled rating refresh failed"),
                }
            }

            info!("rating refresh loop stopped");
        })
    }
}
