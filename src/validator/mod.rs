//! Proxy validation
//!
//! Requests identity-echo sites through each candidate proxy, measures
//! latency and classifies anonymity against our own direct address.

mod echo;
mod probe;
mod request;
mod tunnel;

pub use echo::{classify, combine, parse_echo, EchoIdentity, PROXY_HEADERS};
pub use probe::{ProbeResponse, ProxyProbe, TestSite};
pub use request::ValidationRequest;
pub use tunnel::{TunnelProbe, MAX_BODY_BYTES};

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ValidationConfig;
use crate::error::{Result, ScoutError};
use crate::hub::EventHub;
use crate::models::{
    AnonymityLevel, LogLevel, ProgressStatus, ProxyRecord, RunStatus, ScrapingProgress,
    ValidationReport, ValidationResult,
};
use crate::retry::RetryPolicy;

/// `currentSource` used by the aggregate validation progress events
pub const VALIDATION_SOURCE: &str = "validation";

/// Knobs for one validation run
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub max_concurrent_tests: usize,
    pub test_sites: Vec<String>,
    pub test_timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&ValidationConfig> for ValidationOptions {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            max_concurrent_tests: config.max_concurrent_tests,
            test_sites: config.test_sites.clone(),
            test_timeout: config.test_timeout,
            retry: RetryPolicy::new(config.max_retries),
        }
    }
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self::from(&ValidationConfig::default())
    }
}

struct RunContext<'a> {
    sites: &'a [TestSite],
    real_ip: Option<IpAddr>,
    options: &'a ValidationOptions,
    cancel: &'a CancellationToken,
    total: usize,
    tested: AtomicUsize,
    working: AtomicUsize,
}

/// Validates proxies through a `ProxyProbe` and reports progress to the hub
#[derive(Clone)]
pub struct ProxyValidator {
    probe: Arc<dyn ProxyProbe>,
    hub: EventHub,
}

impl ProxyValidator {
    pub fn new(probe: Arc<dyn ProxyProbe>, hub: EventHub) -> Self {
        Self { probe, hub }
    }

    /// Validate `records` as one batch.
    ///
    /// A proxy that fails every site is a result, not an error. Results come
    /// back in input order; a cancelled run keeps only the proxies that
    /// finished before the token fired.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn validate(
        &self,
        records: Vec<ProxyRecord>,
        options: &ValidationOptions,
        cancel: &CancellationToken,
    ) -> Result<ValidationReport> {
        let sites = options
            .test_sites
            .iter()
            .map(|site| TestSite::parse(site))
            .collect::<Result<Vec<_>>>()?;
        if sites.is_empty() {
            return Err(ScoutError::InvalidRequest(
                "at least one test site is required".to_string(),
            ));
        }

        if records.is_empty() {
            return Ok(ValidationReport::new(RunStatus::Completed, Vec::new()));
        }

        let total = records.len();
        let workers = options.max_concurrent_tests.max(1);
        info!("Validating {} proxies ({} concurrent)", total, workers);
        self.hub.log(
            LogLevel::Info,
            format!("Starting validation of {} proxies", total),
        );
        self.hub.progress(
            ScrapingProgress::new(VALIDATION_SOURCE, ProgressStatus::Started).tested(0, 0),
        );

        let real_ip = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            ip = self.resolve_real_ip(&sites, options.test_timeout) => ip,
        };

        let ctx = RunContext {
            sites: &sites,
            real_ip,
            options,
            cancel,
            total,
            tested: AtomicUsize::new(0),
            working: AtomicUsize::new(0),
        };

        let ctx = &ctx;
        let pending: Vec<_> = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| async move {
                self.validate_one(&record, ctx)
                    .await
                    .map(|result| (index, result))
            })
            .collect();
        let mut results: Vec<(usize, ValidationResult)> = futures::stream::iter(pending)
            .buffer_unordered(workers)
            .filter_map(|result| async move { result })
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        let results: Vec<ValidationResult> = results.into_iter().map(|(_, r)| r).collect();

        let status = if cancel.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        let report = ValidationReport::new(status, results);
        let tested = ctx.tested.load(Ordering::SeqCst);

        match status {
            RunStatus::Cancelled => {
                warn!(
                    "Validation cancelled after {}/{} proxies",
                    report.total, total
                );
                self.hub.progress(
                    ScrapingProgress::new(VALIDATION_SOURCE, ProgressStatus::Error)
                        .ratio(tested, total)
                        .found(report.working_count)
                        .tested(tested, report.working_count)
                        .error("cancelled"),
                );
            }
            RunStatus::Completed => {
                info!(
                    "Validation completed: {}/{} working ({}%)",
                    report.working_count, report.total, report.success_rate_percent
                );
                self.hub.progress(
                    ScrapingProgress::new(VALIDATION_SOURCE, ProgressStatus::Completed)
                        .percent(100)
                        .found(report.working_count)
                        .tested(report.total, report.working_count),
                );
                self.hub.log(
                    LogLevel::Success,
                    format!(
                        "Validation completed: {}/{} proxies working",
                        report.working_count, report.total
                    ),
                );
            }
        }

        Ok(report)
    }

    /// Learn our own public address from the first echo site that answers a
    /// direct request.
    async fn resolve_real_ip(&self, sites: &[TestSite], per_test: Duration) -> Option<IpAddr> {
        for site in sites {
            match timeout(per_test, self.probe.fetch_direct(site)).await {
                Ok(Ok(response)) if response.status.is_success() => {
                    if let Some(ip) = parse_echo(&response.body).and_then(|id| id.primary_origin())
                    {
                        debug!("Direct address is {} (via {})", ip, site.url);
                        return Some(ip);
                    }
                }
                Ok(Ok(response)) => {
                    debug!("Direct check of {} returned {}", site.url, response.status)
                }
                Ok(Err(e)) => debug!("Direct check of {} failed: {}", site.url, e),
                Err(_) => debug!("Direct check of {} timed out", site.url),
            }
        }
        warn!("Could not determine direct address; anonymity will be reported as unknown");
        None
    }

    /// Test one proxy against every site. Returns `None` if cancelled before
    /// the proxy finished.
    async fn validate_one(
        &self,
        record: &ProxyRecord,
        ctx: &RunContext<'_>,
    ) -> Option<ValidationResult> {
        if ctx.cancel.is_cancelled() {
            return None;
        }

        let key = record.key();
        let label = key.to_string();
        let tested_at = Utc::now();
        let per_test = ctx.options.test_timeout;

        let mut levels = Vec::with_capacity(ctx.sites.len());
        let mut fastest: Option<u64> = None;
        let mut last_error: Option<String> = None;

        for site in ctx.sites {
            let probe = &self.probe;
            let attempts = ctx.options.retry.run(&label, move |_| async move {
                let started = Instant::now();
                let response = timeout(per_test, probe.fetch_via(record, site))
                    .await
                    .map_err(|_| ScoutError::ValidationTimeout {
                        timeout_ms: per_test.as_millis() as u64,
                    })??;
                if !response.status.is_success() {
                    return Err(ScoutError::ValidationConnect {
                        message: format!("{} returned HTTP {}", site.url, response.status),
                        transient: response.status.is_server_error(),
                    });
                }
                Ok::<_, ScoutError>((response, started.elapsed()))
            });

            let outcome = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return None,
                (outcome, _) = attempts => outcome,
            };

            match outcome {
                Ok((response, elapsed)) => {
                    let ms = elapsed.as_millis() as u64;
                    fastest = Some(fastest.map_or(ms, |f| f.min(ms)));
                    let identity = parse_echo(&response.body);
                    levels.push(classify(identity.as_ref(), ctx.real_ip));
                }
                Err(e) => {
                    debug!("{} failed against {}: {}", label, site.url, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        let succeeded = fastest.is_some();
        let anonymity_level = combine(levels);
        let is_working = succeeded && anonymity_level != AnonymityLevel::Transparent;
        let error = if is_working {
            None
        } else if anonymity_level == AnonymityLevel::Transparent {
            Some("proxy exposes the client address".to_string())
        } else {
            last_error
        };

        let tested = ctx.tested.fetch_add(1, Ordering::SeqCst) + 1;
        let working = if is_working {
            ctx.working.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            ctx.working.load(Ordering::SeqCst)
        };

        let mut progress = ScrapingProgress::new(label.as_str(), ProgressStatus::Progress)
            .ratio(tested, ctx.total)
            .found(working)
            .tested(tested, working);
        if let Some(error) = &error {
            progress = progress.error(error.clone());
        }
        self.hub.progress(progress);

        Some(ValidationResult {
            proxy_key: key,
            is_working,
            response_time_ms: fastest,
            anonymity_level,
            tested_sites: ctx.sites.iter().map(|s| s.url.clone()).collect(),
            error,
            tested_at,
        })
    }
}
