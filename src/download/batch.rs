//! Concurrent downloads of many targets.
//!
//! Every target runs on its own [`Sicar`] instance, and therefore its own
//! cookie session, inside a Tokio task. A semaphore caps how many attempt
//! loops talk to the portal at once. A failing target is recorded in the
//! [`BatchReport`] and never aborts the others.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use sicar_core::captcha::build_solver;
//! use sicar_core::download::BatchDownloader;
//! use sicar_core::{PolygonKind, SicarConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SicarConfig::default();
//! let solver = build_solver(&config.solver);
//! let batch = BatchDownloader::new(config, solver)?;
//! let report = batch
//!     .download_country(PolygonKind::LegalReserve, Path::new("./reserva_legal"))
//!     .await;
//! println!("{} saved, {} failed", report.succeeded(), report.failed());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{DownloadError, Sicar};
use crate::captcha::CaptchaSolver;
use crate::config::SicarConfig;
use crate::model::{DownloadTarget, PolygonKind, Region};

/// Live counters of a running batch, shared with progress displays.
#[derive(Debug, Default)]
pub struct BatchStats {
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl BatchStats {
    /// Number of targets in the current batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Targets saved so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Targets that failed so far.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Targets finished either way.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.completed() + self.failed()
    }

    fn reset(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
    }

    fn record(&self, result: &Result<PathBuf, DownloadError>) {
        let counter = if result.is_ok() {
            &self.completed
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Result for one target of a batch.
#[derive(Debug)]
pub struct TargetReport {
    /// What was requested.
    pub target: DownloadTarget,
    /// Saved archive path, or why it failed.
    pub result: Result<PathBuf, DownloadError>,
}

/// Per-target results, in request order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per requested target.
    pub targets: Vec<TargetReport>,
}

impl BatchReport {
    /// Number of saved archives.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.targets.iter().filter(|r| r.result.is_ok()).count()
    }

    /// Number of failed targets.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.targets.len() - self.succeeded()
    }

    /// Returns `true` when every target was saved.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Failed targets with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&DownloadTarget, &DownloadError)> {
        self.targets
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (&r.target, e)))
    }
}

/// Runs many downloads with bounded concurrency.
#[derive(Debug)]
pub struct BatchDownloader {
    config: Arc<SicarConfig>,
    solver: Arc<dyn CaptchaSolver>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    interrupt: Arc<AtomicBool>,
    stats: Arc<BatchStats>,
}

impl BatchDownloader {
    /// Creates a downloader allowing `config.max_concurrent_downloads`
    /// simultaneous sessions.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Config`] if `config` fails validation.
    #[instrument(level = "debug", skip(config, solver), fields(concurrency = config.max_concurrent_downloads))]
    pub fn new(config: SicarConfig, solver: Arc<dyn CaptchaSolver>) -> Result<Self, DownloadError> {
        config.validate()?;
        let concurrency = config.max_concurrent_downloads;
        debug!(
            concurrency,
            max_attempts = config.max_attempts,
            "creating batch downloader"
        );
        Ok(Self {
            config: Arc::new(config),
            solver,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            interrupt: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(BatchStats::default()),
        })
    }

    /// Shares `flag` with every spawned orchestrator.
    #[must_use]
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// Configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Counters updated as targets finish.
    #[must_use]
    pub fn stats(&self) -> Arc<BatchStats> {
        Arc::clone(&self.stats)
    }

    /// Downloads `kind` for every region into `dir`.
    pub async fn download_country(&self, kind: PolygonKind, dir: &Path) -> BatchReport {
        let targets = Region::ALL
            .into_iter()
            .map(|region| DownloadTarget::region_polygon(region, kind))
            .collect();
        self.download_targets(targets, dir).await
    }

    /// Downloads every target into `dir`.
    #[instrument(skip(self, targets), fields(targets = targets.len(), output_dir = %dir.display()))]
    pub async fn download_targets(&self, targets: Vec<DownloadTarget>, dir: &Path) -> BatchReport {
        self.stats.reset(targets.len());
        info!(concurrency = self.concurrency, "starting batch");

        let handles: Vec<(DownloadTarget, JoinHandle<Result<PathBuf, DownloadError>>)> = targets
            .into_iter()
            .map(|target| {
                let handle = tokio::spawn(run_one(
                    target.clone(),
                    Arc::clone(&self.config),
                    Arc::clone(&self.solver),
                    Arc::clone(&self.semaphore),
                    Arc::clone(&self.interrupt),
                    Arc::clone(&self.stats),
                    dir.to_path_buf(),
                ));
                (target, handle)
            })
            .collect();

        let mut report = BatchReport::default();
        for (target, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(download = %target, error = %e, "download task panicked");
                    let failed = Err(DownloadError::TaskFailed {
                        target: target.to_string(),
                        reason: e.to_string(),
                    });
                    self.stats.record(&failed);
                    failed
                }
            };
            report.targets.push(TargetReport { target, result });
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "batch complete"
        );
        report
    }
}

async fn run_one(
    target: DownloadTarget,
    config: Arc<SicarConfig>,
    solver: Arc<dyn CaptchaSolver>,
    semaphore: Arc<Semaphore>,
    interrupt: Arc<AtomicBool>,
    stats: Arc<BatchStats>,
    dir: PathBuf,
) -> Result<PathBuf, DownloadError> {
    let result = async {
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| DownloadError::TaskFailed {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        if interrupt.load(Ordering::SeqCst) {
            return Err(DownloadError::Interrupted {
                target: target.to_string(),
                attempts: 0,
            });
        }

        let mut sicar = Sicar::connect(&config, solver)
            .await?
            .with_interrupt(interrupt);
        sicar.download_to(&target, &dir).await
    }
    .await;

    match &result {
        Ok(path) => info!(download = %target, path = %path.display(), "target saved"),
        Err(e) => warn!(download = %target, error = %e, "target failed"),
    }
    stats.record(&result);
    result
}
