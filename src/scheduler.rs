//! Background clustering scheduler
//!
//! Decides when a clustering run should fire and guarantees at most one run
//! is in flight per process. Trigger evaluation is a pure function over a
//! `TriggerState` snapshot so the policy can be tested without any store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::error::{MasteryError, Result};
use crate::pipeline::{ClusteringPipeline, RunSummary};
use crate::types::{PipelineStatus, TriggerConfig, TriggerDecision, TriggerState};

/// Minimum unprocessed messages for the bootstrap trigger
const BOOTSTRAP_THRESHOLD: usize = 2;

/// Runs the pipeline in the background when activity warrants it
pub struct BackgroundScheduler {
    pipeline: Arc<ClusteringPipeline>,
    config: TriggerConfig,
    in_flight: AtomicBool,
}

impl BackgroundScheduler {
    pub fn new(pipeline: Arc<ClusteringPipeline>) -> Self {
        Self::with_config(pipeline, TriggerConfig::default())
    }

    pub fn with_config(pipeline: Arc<ClusteringPipeline>, config: TriggerConfig) -> Self {
        Self {
            pipeline,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Evaluate the trigger policy against a state snapshot.
    ///
    /// The conditions are disjunctive: an unprocessed backlog at or over the
    /// message threshold, enough minutes since the last run (on its own,
    /// regardless of backlog), or the bootstrap case where no run has ever
    /// happened and at least two messages wait.
    pub fn should_trigger(&self, state: &TriggerState) -> TriggerDecision {
        if !self.config.enabled {
            return TriggerDecision::no("clustering disabled");
        }
        if state.unprocessed_count >= self.config.message_threshold {
            return TriggerDecision::yes(format!(
                "{} unprocessed messages (threshold {})",
                state.unprocessed_count, self.config.message_threshold
            ));
        }
        if let Some(minutes) = state.minutes_since_last_run {
            if minutes >= self.config.time_threshold_minutes {
                return TriggerDecision::yes(format!(
                    "{:.1} minutes since last run (threshold {})",
                    minutes, self.config.time_threshold_minutes
                ));
            }
        }
        if !state.has_ever_run && state.unprocessed_count >= BOOTSTRAP_THRESHOLD {
            return TriggerDecision::yes(format!(
                "first run with {} messages waiting",
                state.unprocessed_count
            ));
        }
        TriggerDecision::no("thresholds not met")
    }

    /// Snapshot the trigger inputs from the store
    pub async fn trigger_state(&self) -> Result<TriggerState> {
        let store = self.pipeline.store();
        let unprocessed_count = store.unprocessed_count().await?;
        let latest = store.latest_run().await?;
        let minutes_since_last_run = latest.as_ref().map(|run| {
            (Utc::now() - run.created_at).num_seconds() as f64 / 60.0
        });
        Ok(TriggerState {
            unprocessed_count,
            minutes_since_last_run,
            has_ever_run: latest.is_some(),
        })
    }

    /// Called by the host after persisting a new message. Never blocks the
    /// caller; the trigger check and any resulting run happen on a spawned
    /// task. A rejected concurrent run is logged, not surfaced.
    pub fn notify_message_added(self: &Arc<Self>, conversation_id: &str) {
        let scheduler = Arc::clone(self);
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            let state = match scheduler.trigger_state().await {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not read trigger state");
                    return;
                }
            };

            let decision = scheduler.should_trigger(&state);
            if !decision.trigger {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    reason = %decision.reason,
                    "Clustering not triggered"
                );
                return;
            }

            tracing::info!(conversation_id = %conversation_id, reason = %decision.reason, "Clustering triggered");
            match scheduler.try_run().await {
                Ok(summary) => {
                    tracing::info!(
                        clusters = summary.clusters_created,
                        "Background clustering run finished"
                    );
                }
                Err(MasteryError::ConcurrentRunRejected) => {
                    tracing::info!("Clustering already in flight, skipping");
                }
                Err(MasteryError::InsufficientData(n)) => {
                    tracing::info!(conversations = n, "Not enough data to cluster yet");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Background clustering run failed");
                }
            }
        });
    }

    /// Run the pipeline now, bypassing the trigger policy but keeping the
    /// single-flight guarantee.
    pub async fn force_run(&self) -> Result<RunSummary> {
        self.try_run().await
    }

    /// Single-flight pipeline run. The in-flight flag is cleared no matter
    /// how the run ends.
    async fn try_run(&self) -> Result<RunSummary> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MasteryError::ConcurrentRunRejected);
        }

        let result = self.pipeline.run().await;
        self.in_flight.store(false, Ordering::Release);
        result
    }

    /// Operator-facing snapshot of the pipeline state
    pub async fn status(&self) -> Result<PipelineStatus> {
        let state = self.trigger_state().await?;
        let decision = self.should_trigger(&state);
        let latest = self.pipeline.store().latest_run().await?;
        Ok(PipelineStatus {
            enabled: self.config.enabled,
            run_in_progress: self.in_flight.load(Ordering::Acquire),
            unprocessed_messages: state.unprocessed_count,
            minutes_since_last_run: state.minutes_since_last_run,
            decision,
            latest_run: latest,
        })
    }
}
