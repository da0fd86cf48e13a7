//! Job tracker
//!
//! Turns an engine job handle into a uniform event sequence:
//! zero or more `Progress` events with non-decreasing percent, then exactly
//! one terminal `Success` or `Failure`.
//!
//! **Guarantees:**
//! - At most one terminal event; the sequence ends after it
//! - Nothing is delivered once cancellation is requested
//! - Losing the engine signal for longer than `signal_timeout` yields
//!   `Failure(Timeout)` instead of waiting forever

use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::engine_gateway::{EngineGateway, JobHandle, JobPayload, RemoteJobStatus};
use crate::models::ProgressSnapshot;

/// Tracker timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Delay between status queries
    pub poll_interval: Duration,
    /// Longest tolerated gap without any engine signal
    pub signal_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            signal_timeout: Duration::from_secs(60),
        }
    }
}

/// Why a job ended without artifacts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// Engine reported an error
    #[error("{0}")]
    Remote(String),

    /// No engine signal within the configured timeout
    #[error("no response from engine for {:?}{}", .after, last_error_suffix(.last_error))]
    Timeout {
        after: Duration,
        last_error: Option<String>,
    },

    /// Job revoked on the engine side
    #[error("job was cancelled by the engine")]
    Revoked,
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {})", e),
        None => String::new(),
    }
}

/// Normalized job event
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress(ProgressSnapshot),
    Success(JobPayload),
    Failure(FailureReason),
}

/// Receiver of one job's events
pub trait JobObserver: Send + Sync + 'static {
    fn on_progress(&self, progress: ProgressSnapshot);
    fn on_success(&self, payload: JobPayload);
    fn on_failure(&self, reason: FailureReason);
}

/// Active observer attachment
///
/// Dropping the subscription cancels it.
pub struct Subscription {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivering events
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the delivery task has ended
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Job subscription task ended abnormally");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Clamps, orders and de-duplicates raw engine progress
#[derive(Debug, Default)]
struct ProgressNormalizer {
    last: Option<ProgressSnapshot>,
}

impl ProgressNormalizer {
    fn apply(&mut self, raw_percent: f64, message: String) -> Option<ProgressSnapshot> {
        let floor = self.last.as_ref().map(|p| p.percent).unwrap_or(0);
        let reported = if raw_percent.is_finite() {
            raw_percent.clamp(0.0, 100.0).floor() as u8
        } else {
            floor
        };
        let snapshot = ProgressSnapshot::new(reported.max(floor), message);

        if self.last.as_ref() == Some(&snapshot) {
            return None;
        }
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }
}

/// Follows engine jobs and emits normalized events
#[derive(Clone)]
pub struct JobTracker {
    gateway: Arc<dyn EngineGateway>,
    config: TrackerConfig,
}

impl JobTracker {
    pub fn new(gateway: Arc<dyn EngineGateway>, config: TrackerConfig) -> Self {
        Self { gateway, config }
    }

    /// Lazy event sequence for one job
    ///
    /// Polling starts when the stream is first polled and stops when the
    /// stream is dropped, a terminal event is produced, or `cancel` fires.
    pub fn track(
        &self,
        handle: JobHandle,
        cancel: CancellationToken,
    ) -> impl Stream<Item = JobEvent> + Send + 'static {
        let gateway = Arc::clone(&self.gateway);
        let config = self.config.clone();

        async_stream::stream! {
            let mut normalizer = ProgressNormalizer::default();
            let mut last_signal = Instant::now();
            let mut ticker = tokio::time::interval(config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let remaining = config
                    .signal_timeout
                    .saturating_sub(last_signal.elapsed())
                    .max(Duration::from_millis(1));

                let status = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    status = tokio::time::timeout(remaining, gateway.job_status(&handle)) => status,
                };

                if cancel.is_cancelled() {
                    break;
                }

                let poll_error = match status {
                    Ok(Ok(RemoteJobStatus::Pending)) => {
                        last_signal = Instant::now();
                        None
                    }
                    Ok(Ok(RemoteJobStatus::Running { percent, message })) => {
                        last_signal = Instant::now();
                        if let Some(progress) = normalizer.apply(percent, message) {
                            yield JobEvent::Progress(progress);
                        }
                        None
                    }
                    Ok(Ok(RemoteJobStatus::Succeeded(payload))) => {
                        debug!(job_id = %handle.job_id(), "Job succeeded");
                        yield JobEvent::Success(payload);
                        break;
                    }
                    Ok(Ok(RemoteJobStatus::Failed { reason })) => {
                        debug!(job_id = %handle.job_id(), reason = %reason, "Job failed");
                        yield JobEvent::Failure(FailureReason::Remote(reason));
                        break;
                    }
                    Ok(Ok(RemoteJobStatus::Cancelled)) => {
                        yield JobEvent::Failure(FailureReason::Revoked);
                        break;
                    }
                    Ok(Err(e)) if e.is_terminal() => {
                        warn!(job_id = %handle.job_id(), error = %e, "Engine no longer knows the job");
                        yield JobEvent::Failure(FailureReason::Remote(e.to_string()));
                        break;
                    }
                    Ok(Err(e)) => {
                        warn!(job_id = %handle.job_id(), error = %e, "Job status query failed");
                        Some(e.to_string())
                    }
                    Err(_) => {
                        warn!(job_id = %handle.job_id(), "Job status query timed out");
                        Some("status query timed out".to_string())
                    }
                };

                if last_signal.elapsed() >= config.signal_timeout {
                    warn!(
                        job_id = %handle.job_id(),
                        timeout_ms = config.signal_timeout.as_millis() as u64,
                        "Lost engine signal, giving up on job"
                    );
                    yield JobEvent::Failure(FailureReason::Timeout {
                        after: config.signal_timeout,
                        last_error: poll_error,
                    });
                    break;
                }
            }
        }
    }

    /// Deliver one job's events to an observer on a background task
    pub fn subscribe(&self, handle: JobHandle, observer: Arc<dyn JobObserver>) -> Subscription {
        let token = CancellationToken::new();
        let events = self.track(handle.clone(), token.clone());
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let mut events = Box::pin(events);
            while let Some(event) = events.next().await {
                if task_token.is_cancelled() {
                    debug!(job_id = %handle.job_id(), "Dropping event after cancellation");
                    break;
                }
                match event {
                    JobEvent::Progress(progress) => observer.on_progress(progress),
                    JobEvent::Success(payload) => observer.on_success(payload),
                    JobEvent::Failure(reason) => observer.on_failure(reason),
                }
            }
        });

        Subscription {
            token,
            task: Some(task),
        }
    }
}
