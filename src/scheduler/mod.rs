//! Periodic evaluation of every user's active automations.
//!
//! A single interval drives ticks. Each tick is its own task, so a slow tick
//! never delays the next one:
//!
//! ```text
//! interval ─► tick ─► all_users ─► per user: automations
//!                                    └─► per active automation (bounded pool):
//!                                          evaluate → Evaluation
//! ```
//!
//! Concurrency is capped by a semaphore shared across overlapping ticks, and
//! an automation still being evaluated by an earlier tick is skipped.

mod evaluation;
mod in_flight;

pub use evaluation::{Evaluation, SkipReason, Stage};

use crate::error::AreaError;
use crate::model::{Automation, User};
use crate::persistence::PersistenceGateway;
use crate::registry::ConnectorRegistry;
use in_flight::InFlight;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Fixed cadence of the polling loop.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// What to do with a fired checkpoint when the reaction side cannot run
/// (missing reaction token or unknown reaction).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedReactionPolicy {
    /// Keep the old checkpoint so the event fires again once the reaction
    /// side resolves.
    #[default]
    Retain,
    /// Advance the checkpoint and drop the event.
    Advance,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    /// Upper bound on automation evaluations running at once, across ticks.
    pub max_concurrency: usize,
    /// Timeout applied to every `check` and `execute` call.
    pub call_timeout: Duration,
    pub on_unresolved_reaction: UnresolvedReactionPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            max_concurrency: 64,
            call_timeout: Duration::from_secs(30),
            on_unresolved_reaction: UnresolvedReactionPolicy::default(),
        }
    }
}

/// Counts of one tick.
///
/// `evaluated` is the number of active automations handled. `failed` also
/// counts users whose automations could not be loaded, so
/// `fired + idle + skipped + failed` can exceed `evaluated`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub users: usize,
    pub evaluated: usize,
    pub fired: usize,
    pub idle: usize,
    pub inactive: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, evaluation: &Evaluation) {
        self.evaluated += 1;
        match evaluation {
            Evaluation::Idle => self.idle += 1,
            Evaluation::Fired => self.fired += 1,
            Evaluation::Skipped(_) => self.skipped += 1,
            Evaluation::Failed(_) => self.failed += 1,
        }
    }

    fn merge(&mut self, other: TickReport) {
        self.evaluated += other.evaluated;
        self.fired += other.fired;
        self.idle += other.idle;
        self.inactive += other.inactive;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// The polling engine. Cheap to clone; clones share the pool and the
/// in-flight set.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<ConnectorRegistry>,
    gateway: Arc<dyn PersistenceGateway>,
    config: Arc<SchedulerConfig>,
    permits: Arc<Semaphore>,
    in_flight: InFlight,
}

impl Scheduler {
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        gateway: Arc<dyn PersistenceGateway>,
        config: SchedulerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            registry,
            gateway,
            config: Arc::new(config),
            permits,
            in_flight: InFlight::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs one tick to completion.
    ///
    /// Returns only after every evaluation spawned by this tick has ended.
    /// Fails only when the user list cannot be loaded.
    pub async fn tick(&self) -> Result<TickReport, AreaError> {
        let users = self.gateway.all_users().await?;
        let mut report = TickReport {
            users: users.len(),
            ..Default::default()
        };

        let mut per_user = JoinSet::new();
        for user in users {
            let scheduler = self.clone();
            let span = info_span!("user", user_id = %user.id);
            per_user.spawn(async move { scheduler.evaluate_user(user).await }.instrument(span));
        }

        while let Some(joined) = per_user.join_next().await {
            match joined {
                Ok(user_report) => report.merge(user_report),
                Err(e) => {
                    error!(error = %e, "User evaluation task aborted");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn evaluate_user(&self, user: User) -> TickReport {
        let mut report = TickReport::default();

        let automations = match self.gateway.automations(user.id).await {
            Ok(automations) => automations,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Failed to load automations");
                report.failed += 1;
                return report;
            }
        };

        let user = Arc::new(user);
        let mut evaluations = JoinSet::new();
        for automation in automations {
            if !automation.active {
                report.inactive += 1;
                continue;
            }

            let Some(guard) = self.in_flight.try_acquire(automation.id) else {
                debug!(
                    user_id = %user.id,
                    automation_id = %automation.id,
                    "Previous evaluation still in flight, skipping"
                );
                report.record(&Evaluation::Skipped(SkipReason::InFlight));
                continue;
            };

            let scheduler = self.clone();
            let user = Arc::clone(&user);
            evaluations.spawn(
                async move {
                    let _guard = guard;
                    scheduler.evaluate_pooled(&user, &automation).await
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = evaluations.join_next().await {
            match joined {
                Ok(evaluation) => report.record(&evaluation),
                Err(e) => {
                    error!(user_id = %user.id, error = %e, "Automation evaluation task aborted");
                    report.record(&Evaluation::Failed(Stage::Task));
                }
            }
        }

        report
    }

    async fn evaluate_pooled(&self, user: &User, automation: &Automation) -> Evaluation {
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return Evaluation::Skipped(SkipReason::PoolClosed);
        };
        self.evaluate(user, automation).await
    }

    async fn run_tick(&self) {
        let tick_id = Uuid::now_v7();
        let span = info_span!("tick", tick_id = %tick_id);
        async {
            match self.tick().await {
                Ok(report) => {
                    if report.fired > 0 || report.failed > 0 {
                        info!(
                            users = report.users,
                            evaluated = report.evaluated,
                            fired = report.fired,
                            skipped = report.skipped,
                            failed = report.failed,
                            "Tick completed"
                        );
                    } else {
                        debug!(
                            users = report.users,
                            evaluated = report.evaluated,
                            idle = report.idle,
                            inactive = report.inactive,
                            skipped = report.skipped,
                            "Tick completed"
                        );
                    }
                }
                Err(e) => error!(error = %e, "Tick aborted"),
            }
        }
        .instrument(span)
        .await
    }

    /// Starts the polling loop (non-blocking).
    ///
    /// The loop stops scheduling ticks once `shutdown` turns `true` (or its
    /// sender is dropped), then waits for in-flight ticks before the returned
    /// handle completes.
    pub fn start(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            info!(
                interval_secs = scheduler.config.poll_interval.as_secs(),
                max_concurrency = scheduler.config.max_concurrency,
                call_timeout_secs = scheduler.config.call_timeout.as_secs(),
                connectors = scheduler.registry.len(),
                "Starting scheduler"
            );

            let mut ticker = interval(scheduler.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks = JoinSet::new();

            while !*shutdown.borrow() {
                tokio::select! {
                    _ = ticker.tick() => {
                        let scheduler = scheduler.clone();
                        ticks.spawn(async move { scheduler.run_tick().await });
                    }
                    Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                        if let Err(e) = joined {
                            error!(error = %e, "Tick task aborted");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            info!(in_flight_ticks = ticks.len(), "Scheduler stopping, draining in-flight ticks");
            while let Some(joined) = ticks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Tick task aborted");
                }
            }
            info!("Scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.max_concurrency, 64);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.on_unresolved_reaction, UnresolvedReactionPolicy::Retain);
    }

    #[test]
    fn test_policy_serde() {
        let policy: UnresolvedReactionPolicy = serde_json::from_str(r#""advance""#).unwrap();
        assert_eq!(policy, UnresolvedReactionPolicy::Advance);
        assert!(serde_json::from_str::<UnresolvedReactionPolicy>(r#""drop""#).is_err());
    }

    #[test]
    fn test_report_accounting() {
        let mut report = TickReport::default();
        report.record(&Evaluation::Idle);
        report.record(&Evaluation::Fired);
        report.record(&Evaluation::Skipped(SkipReason::InFlight));
        report.record(&Evaluation::Failed(Stage::Reaction));

        let mut total = TickReport {
            users: 1,
            inactive: 2,
            ..Default::default()
        };
        total.merge(report);

        assert_eq!(total.evaluated, 4);
        assert_eq!(total.fired + total.idle + total.skipped + total.failed, 4);
        assert_eq!(total.inactive, 2);
        assert_eq!(total.users, 1);
    }
}
