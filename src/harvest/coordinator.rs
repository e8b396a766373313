//! Multi-source harvest with bounded concurrency
//!
//! Runs the selected adapters through a `buffer_unordered` pool, wraps every
//! adapter invocation (retries included) in a hard timeout and merges the
//! results into one deduplicated set once every source has resolved.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::source::SourceAdapter;
use crate::config::HarvestConfig;
use crate::error::{Result, ScoutError};
use crate::hub::EventHub;
use crate::models::{
    HarvestReport, LogLevel, ProgressStatus, ProxyKey, ProxyRecord, RunStatus, ScrapingProgress,
    SourceOutcome, SourceStatus,
};
use crate::retry::RetryPolicy;

/// `currentSource` used by the aggregate progress event
pub const AGGREGATE_SOURCE: &str = "all";

/// Knobs for one harvest run
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub max_concurrent_sources: usize,
    pub source_timeout: Duration,
    pub page_limit: u32,
    pub retry: RetryPolicy,
}

impl From<&HarvestConfig> for HarvestOptions {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            max_concurrent_sources: config.max_concurrent_sources,
            source_timeout: config.source_timeout,
            page_limit: config.page_limit,
            retry: RetryPolicy::new(config.max_retries),
        }
    }
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self::from(&HarvestConfig::default())
    }
}

struct SourceRun {
    index: usize,
    name: String,
    status: SourceStatus,
    records: Vec<ProxyRecord>,
    error: Option<String>,
    elapsed_ms: u64,
}

/// Drives adapters and reports progress to the event hub
#[derive(Clone)]
pub struct HarvestCoordinator {
    hub: EventHub,
}

impl HarvestCoordinator {
    pub fn new(hub: EventHub) -> Self {
        Self { hub }
    }

    /// Harvest every source in `sources`.
    ///
    /// Fails only when the selection is empty or every source failed. A
    /// cancelled run returns whatever finished before the token fired, tagged
    /// `cancelled`.
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn harvest_all(
        &self,
        sources: &[Arc<dyn SourceAdapter>],
        options: &HarvestOptions,
        cancel: &CancellationToken,
    ) -> Result<HarvestReport> {
        if sources.is_empty() {
            return Err(ScoutError::InvalidRequest(
                "no sources selected for harvest".to_string(),
            ));
        }

        let total = sources.len();
        let workers = options.max_concurrent_sources.max(1);
        info!(
            "Starting harvest of {} sources ({} concurrent)",
            total, workers
        );
        self.hub.log(
            LogLevel::Info,
            format!("Starting proxy harvest from {} sources", total),
        );

        let finished = AtomicUsize::new(0);
        let found = AtomicUsize::new(0);

        // Futures are lazy; a run starts only once buffer_unordered grants it a slot
        let pending: Vec<_> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                self.run_source(index, source.as_ref(), options, cancel, total, &finished, &found)
            })
            .collect();
        let mut runs: Vec<SourceRun> = futures::stream::iter(pending)
            .buffer_unordered(workers)
            .collect()
            .await;

        // Join barrier passed; merge in declaration order
        runs.sort_by_key(|run| run.index);
        let cancelled = cancel.is_cancelled();
        let (records, outcomes) = merge_runs(runs);
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();

        if cancelled {
            warn!("Harvest cancelled with {} unique proxies", records.len());
            self.hub.progress(
                ScrapingProgress::new(AGGREGATE_SOURCE, ProgressStatus::Error)
                    .ratio(finished.load(Ordering::SeqCst), total)
                    .found(records.len())
                    .error("cancelled"),
            );
            return Ok(HarvestReport::new(RunStatus::Cancelled, records, outcomes));
        }

        if succeeded == 0 {
            let errors: Vec<String> = outcomes
                .iter()
                .map(|o| format!("{}: {}", o.source, o.error.as_deref().unwrap_or("unknown error")))
                .collect();
            warn!("All {} sources failed", total);
            self.hub.progress(
                ScrapingProgress::new(AGGREGATE_SOURCE, ProgressStatus::Error)
                    .percent(100)
                    .error("all sources failed"),
            );
            self.hub.log(LogLevel::Error, "Proxy harvest failed: all sources failed");
            return Err(ScoutError::AllSourcesFailed {
                count: total,
                errors,
            });
        }

        let report = HarvestReport::new(RunStatus::Completed, records, outcomes);
        info!(
            "Harvest completed: {} unique proxies from {}/{} sources",
            report.total, succeeded, total
        );
        self.hub.progress(
            ScrapingProgress::new(AGGREGATE_SOURCE, ProgressStatus::Completed)
                .percent(100)
                .found(report.total),
        );
        self.hub.log(
            LogLevel::Success,
            format!(
                "Harvest completed: {} unique proxies from {}/{} sources",
                report.total, succeeded, total
            ),
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_source(
        &self,
        index: usize,
        source: &dyn SourceAdapter,
        options: &HarvestOptions,
        cancel: &CancellationToken,
        total: usize,
        finished: &AtomicUsize,
        found: &AtomicUsize,
    ) -> SourceRun {
        let name = source.name().to_string();
        let started = Instant::now();

        if cancel.is_cancelled() {
            return SourceRun {
                index,
                name,
                status: SourceStatus::Cancelled,
                records: Vec::new(),
                error: Some(ScoutError::Cancelled.to_string()),
                elapsed_ms: 0,
            };
        }

        self.hub.progress(
            ScrapingProgress::new(name.as_str(), ProgressStatus::Started)
                .ratio(finished.load(Ordering::SeqCst), total)
                .found(found.load(Ordering::SeqCst)),
        );

        let hub = &self.hub;
        let source_name = name.as_str();
        let attempts = options.retry.run(source_name, move |attempt| {
            if attempt > 1 {
                hub.progress(
                    ScrapingProgress::new(source_name, ProgressStatus::Progress)
                        .ratio(finished.load(Ordering::SeqCst), total)
                        .found(found.load(Ordering::SeqCst)),
                );
            }
            source.harvest(options.page_limit)
        });

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScoutError::Cancelled),
            result = timeout(options.source_timeout, attempts) => match result {
                Ok((result, _)) => result,
                Err(_) => Err(ScoutError::SourceTimeout {
                    source_name: name.clone(),
                    timeout_ms: options.source_timeout.as_millis() as u64,
                }),
            },
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let done = finished.fetch_add(1, Ordering::SeqCst) + 1;

        match result {
            Ok(records) => {
                let so_far = found.fetch_add(records.len(), Ordering::SeqCst) + records.len();
                debug!("{} returned {} records in {}ms", name, records.len(), elapsed_ms);
                self.hub.progress(
                    ScrapingProgress::new(name.as_str(), ProgressStatus::Completed)
                        .ratio(done, total)
                        .found(so_far),
                );
                SourceRun {
                    index,
                    name,
                    status: SourceStatus::Succeeded,
                    records,
                    error: None,
                    elapsed_ms,
                }
            }
            Err(e) => {
                let status = match e {
                    ScoutError::Cancelled => SourceStatus::Cancelled,
                    ScoutError::SourceTimeout { .. } => SourceStatus::Timeout,
                    _ => SourceStatus::Failed,
                };
                warn!("Source {} failed: {}", name, e);
                self.hub.progress(
                    ScrapingProgress::new(name.as_str(), ProgressStatus::Error)
                        .ratio(done, total)
                        .found(found.load(Ordering::SeqCst))
                        .error(e.to_string()),
                );
                SourceRun {
                    index,
                    name,
                    status,
                    records: Vec::new(),
                    error: Some(e.to_string()),
                    elapsed_ms,
                }
            }
        }
    }
}

/// Deduplicate by key, crediting each proxy to the first source (in
/// declaration order) that produced it. `runs` must be sorted by index.
fn merge_runs(runs: Vec<SourceRun>) -> (Vec<ProxyRecord>, Vec<SourceOutcome>) {
    let mut seen: HashSet<ProxyKey> = HashSet::new();
    let mut records = Vec::new();
    let mut outcomes = Vec::with_capacity(runs.len());

    for run in runs {
        let raw_count = run.records.len();
        let mut unique_count = 0;
        for record in run.records {
            if seen.insert(record.key()) {
                unique_count += 1;
                records.push(record);
            }
        }
        outcomes.push(SourceOutcome {
            source: run.name,
            status: run.status,
            raw_count,
            unique_count,
            error: run.error,
            elapsed_ms: run.elapsed_ms,
        });
    }

    (records, outcomes)
}
