//! Broadcast fan-out engine.
//!
//! Deliveries are sequential with a fixed pause between sends, so one run
//! stays far below Telegram's flood limits. Per-recipient failures are
//! isolated: a blocked recipient is flagged in storage and the run carries
//! on. Each delivery is attempted at most once; there are no retries
//! inside a run.

use crate::config::{BROADCAST_PROGRESS_EVERY, BROADCAST_THROTTLE};
use crate::models::DeliveryStatus;
use crate::storage::Repository;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Why one delivery did not go through.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The recipient has blocked the bot or deleted their account.
    /// Terminal for this user: they are flagged and excluded from
    /// future runs.
    #[error("recipient unreachable")]
    Forbidden,
    /// Anything else. Counted as failed for this run only.
    #[error("delivery failed: {0}")]
    Other(String),
}

/// What one broadcast sends. Decided once per broadcast, identical for
/// every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastPayload {
    Text(String),
    /// A photo already known to the transport, re-sent by its file ID.
    Photo { file_id: String, caption: String },
}

impl BroadcastPayload {
    /// Text content, used for the stored broadcast body and the title.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Text(body) => body,
            Self::Photo { caption, .. } => caption,
        }
    }
}

/// Sends one broadcast message to one recipient.
///
/// The engine is written against this seam so tests can run a full
/// fan-out without a network.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    async fn deliver(&self, tg_id: i64, payload: &BroadcastPayload) -> Result<(), DeliveryError>;
}

/// Receives coarse progress updates during a run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Called every few recipients and once at the end. Errors from the
    /// sink are swallowed by the engine; progress is best-effort.
    async fn progress(&self, processed: usize, total: usize);
}

/// A sink that reports nowhere.
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn progress(&self, _processed: usize, _total: usize) {}
}

/// Terminal counters of one broadcast run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub total: usize,
    pub sent: usize,
    pub blocked: usize,
    pub failed: usize,
}

impl DeliveryReport {
    /// Sent share of all processed recipients, `0.0` for an empty run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.sent as f64 / self.total as f64
    }
}

/// Sequential broadcast runner.
pub struct Broadcaster {
    repo: Arc<dyn Repository>,
    throttle: Duration,
    progress_every: usize,
}

impl Broadcaster {
    #[must_use]
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self::with_pacing(repo, BROADCAST_THROTTLE, BROADCAST_PROGRESS_EVERY)
    }

    /// Custom pacing, used by tests to run without sleeping.
    #[must_use]
    pub fn with_pacing(
        repo: Arc<dyn Repository>,
        throttle: Duration,
        progress_every: usize,
    ) -> Self {
        Self {
            repo,
            throttle,
            progress_every: progress_every.max(1),
        }
    }

    /// Runs one broadcast to every currently deliverable user.
    ///
    /// Records the broadcast and a delivery row per recipient, then walks
    /// the queued set once. A [`DeliveryError::Forbidden`] recipient is
    /// flagged as blocked in the same pass.
    ///
    /// # Errors
    ///
    /// Only storage errors abort the run; delivery errors never do.
    pub async fn run(
        &self,
        title: &str,
        payload: &BroadcastPayload,
        created_by_tg_id: i64,
        transport: &dyn BroadcastTransport,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<DeliveryReport> {
        let broadcast_id = self
            .repo
            .create_broadcast(title, payload.text(), created_by_tg_id)
            .await?;
        let queued = self.repo.create_deliveries_for_broadcast(broadcast_id).await?;
        self.repo.mark_broadcast_started(broadcast_id).await?;

        // Snapshot of the queue; users joining mid-run are not included
        #[allow(clippy::cast_possible_wrap)]
        let deliveries = self
            .repo
            .get_queued_deliveries(broadcast_id, queued as i64)
            .await?;

        let mut report = DeliveryReport {
            total: deliveries.len(),
            ..DeliveryReport::default()
        };
        info!(
            "📢 Broadcast {} started: {} recipients",
            broadcast_id, report.total
        );

        for (index, delivery) in deliveries.iter().enumerate() {
            match transport.deliver(delivery.tg_id, payload).await {
                Ok(()) => {
                    report.sent += 1;
                    self.repo
                        .update_delivery_status(delivery.delivery_id, DeliveryStatus::Sent, None)
                        .await?;
                }
                Err(DeliveryError::Forbidden) => {
                    report.blocked += 1;
                    self.repo
                        .update_delivery_status(
                            delivery.delivery_id,
                            DeliveryStatus::Blocked,
                            Some("forbidden"),
                        )
                        .await?;
                    self.repo
                        .set_user_blocked(delivery.tg_id, true, "broadcast_forbidden")
                        .await?;
                    info!("🚷 User {} blocked the bot, flagged", delivery.tg_id);
                }
                Err(DeliveryError::Other(reason)) => {
                    report.failed += 1;
                    self.repo
                        .update_delivery_status(
                            delivery.delivery_id,
                            DeliveryStatus::Failed,
                            Some(&reason),
                        )
                        .await?;
                    warn!(
                        "⚠️ Delivery to {} failed: {}",
                        delivery.tg_id, reason
                    );
                }
            }

            let processed = index + 1;
            if processed % self.progress_every == 0 {
                progress.progress(processed, report.total).await;
            }

            if !self.throttle.is_zero() && processed < report.total {
                tokio::time::sleep(self.throttle).await;
            }
        }

        progress.progress(report.total, report.total).await;

        match serde_json::to_string(&report) {
            Ok(stats) => {
                self.repo
                    .mark_broadcast_finished(broadcast_id, &stats)
                    .await?;
            }
            Err(e) => error!("Failed to serialize broadcast stats: {}", e),
        }

        info!(
            "✅ Broadcast {} finished: {} sent, {} blocked, {} failed ({:.0}% success)",
            broadcast_id,
            report.sent,
            report.blocked,
            report.failed,
            report.success_ratio() * 100.0
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::models::QueuedDelivery;
    use crate::storage::MockRepository;
    use std::sync::Mutex;

    /// Transport that fails for a configured set of recipients.
    struct ScriptedTransport {
        forbidden: Vec<i64>,
        flaky: Vec<i64>,
        delivered: Mutex<Vec<i64>>,
    }

    impl ScriptedTransport {
        fn new(forbidden: Vec<i64>, flaky: Vec<i64>) -> Self {
            Self {
                forbidden,
                flaky,
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BroadcastTransport for ScriptedTransport {
        async fn deliver(
            &self,
            tg_id: i64,
            _payload: &BroadcastPayload,
        ) -> Result<(), DeliveryError> {
            if self.forbidden.contains(&tg_id) {
                return Err(DeliveryError::Forbidden);
            }
            if self.flaky.contains(&tg_id) {
                return Err(DeliveryError::Other("timeout".to_string()));
            }
            self.delivered.lock().unwrap().push(tg_id);
            Ok(())
        }
    }

    fn text(body: &str) -> BroadcastPayload {
        BroadcastPayload::Text(body.to_string())
    }

    struct RecordingSink {
        calls: Mutex<Vec<(usize, usize)>>,
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn progress(&self, processed: usize, total: usize) {
            self.calls.lock().unwrap().push((processed, total));
        }
    }

    fn queue(ids: &[i64]) -> Vec<QueuedDelivery> {
        ids.iter()
            .enumerate()
            .map(|(i, &tg_id)| QueuedDelivery {
                delivery_id: i as i64 + 1,
                user_id: i as i64 + 1,
                tg_id,
            })
            .collect()
    }

    fn repo_with_queue(ids: Vec<i64>) -> MockRepository {
        let mut repo = MockRepository::new();
        repo.expect_create_broadcast().returning(|_, _, _| Ok(7));
        let count = ids.len() as u64;
        repo.expect_create_deliveries_for_broadcast()
            .returning(move |_| Ok(count));
        repo.expect_mark_broadcast_started().returning(|_| Ok(()));
        repo.expect_get_queued_deliveries()
            .returning(move |_, _| Ok(queue(&ids)));
        repo.expect_update_delivery_status().returning(|_, _, _| Ok(()));
        repo.expect_mark_broadcast_finished().returning(|_, _| Ok(()));
        repo
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let mut repo = repo_with_queue(vec![10, 20, 30, 40]);
        // The forbidden recipient gets flagged exactly once
        repo.expect_set_user_blocked()
            .withf(|tg_id, blocked, reason| {
                *tg_id == 20 && *blocked && reason == "broadcast_forbidden"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let broadcaster =
            Broadcaster::with_pacing(Arc::new(repo), Duration::ZERO, 10);
        let transport = ScriptedTransport::new(vec![20], vec![30]);
        let report = broadcaster
            .run("t", &text("hello"), 1, &transport, &NoProgress)
            .await
            .unwrap();

        assert_eq!(
            report,
            DeliveryReport {
                total: 4,
                sent: 2,
                blocked: 1,
                failed: 1,
            }
        );
        // Every non-failing recipient was still reached, in order
        assert_eq!(*transport.delivered.lock().unwrap(), vec![10, 40]);
    }

    #[tokio::test]
    async fn test_progress_cadence() {
        let repo = repo_with_queue(vec![1, 2, 3, 4, 5]);
        let broadcaster = Broadcaster::with_pacing(Arc::new(repo), Duration::ZERO, 2);
        let transport = ScriptedTransport::new(vec![], vec![]);
        let sink = RecordingSink {
            calls: Mutex::new(Vec::new()),
        };

        broadcaster
            .run("t", &text("hi"), 1, &transport, &sink)
            .await
            .unwrap();

        // Every second recipient, plus the terminal update
        assert_eq!(
            *sink.calls.lock().unwrap(),
            vec![(2, 5), (4, 5), (5, 5)]
        );
    }

    #[tokio::test]
    async fn test_empty_run() {
        let repo = repo_with_queue(vec![]);
        let broadcaster = Broadcaster::with_pacing(Arc::new(repo), Duration::ZERO, 10);
        let transport = ScriptedTransport::new(vec![], vec![]);
        let report = broadcaster
            .run("t", &text("hi"), 1, &transport, &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.total, 0);
        // Zero recipients is not a division by zero
        assert!((report.success_ratio() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_ratio() {
        let report = DeliveryReport {
            total: 4,
            sent: 3,
            blocked: 1,
            failed: 0,
        };
        assert!((report.success_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
