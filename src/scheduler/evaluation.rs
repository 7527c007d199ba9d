//! Evaluation of a single automation.
//!
//! ```text
//! trigger token → trigger → check ─┬─ no event → persist advanced checkpoint
//!                                  └─ event → reaction token → reaction
//!                                             → persist checkpoint → execute
//! ```
//!
//! Everything that can go wrong here ends as an [`Evaluation`] value; nothing
//! escapes to the tick.

use super::{Scheduler, UnresolvedReactionPolicy};
use crate::connector::{CheckContext, Reaction, ReactionContext};
use crate::model::{Automation, AutomationUpdate, OAuthToken, User};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of evaluating one active automation during a tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evaluation {
    /// The trigger observed nothing new.
    Idle,
    /// The trigger fired and the reaction completed.
    Fired,
    /// Failed closed before the reaction could run.
    Skipped(SkipReason),
    /// A call or a checkpoint write failed.
    Failed(Stage),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// A previous evaluation of the same automation has not finished.
    InFlight,
    /// The user has no token for this service.
    MissingToken { service: String },
    /// The stored token for this service has expired.
    ExpiredToken { service: String },
    UnknownTrigger { service: String, id: u32 },
    UnknownReaction { service: String, id: u32 },
    /// The worker pool no longer hands out permits.
    PoolClosed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InFlight => write!(f, "previous evaluation still in flight"),
            Self::MissingToken { service } => write!(f, "no token for service `{}`", service),
            Self::ExpiredToken { service } => write!(f, "token for service `{}` expired", service),
            Self::UnknownTrigger { service, id } => write!(f, "unknown trigger `{}/{}`", service, id),
            Self::UnknownReaction { service, id } => write!(f, "unknown reaction `{}/{}`", service, id),
            Self::PoolClosed => write!(f, "worker pool closed"),
        }
    }
}

/// Where a failed evaluation stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Reading the token from the gateway.
    Token,
    Check,
    Checkpoint,
    Reaction,
    /// The evaluation task itself panicked outside a guarded call.
    Task,
}

/// Why a guarded trigger/reaction call produced no value.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CallError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("panicked: {0}")]
    Panicked(String),
    #[error("{0:#}")]
    Failed(anyhow::Error),
}

/// Runs `fut` under a timeout, converting a panic into [`CallError::Panicked`].
pub(crate) async fn guarded<T, F>(timeout: Duration, fut: F) -> Result<T, CallError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await {
        Err(_) => Err(CallError::Timeout(timeout)),
        Ok(Err(panic)) => Err(CallError::Panicked(panic_message(panic.as_ref()))),
        Ok(Ok(Err(e))) => Err(CallError::Failed(e)),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Scheduler {
    /// Evaluates one active automation end to end.
    pub(super) async fn evaluate(&self, user: &User, automation: &Automation) -> Evaluation {
        let trigger_token = match self.resolve_token(user, &automation.trigger_service_id).await {
            Ok(token) => token,
            Err(outcome) => return self.log_unresolved(user, automation, outcome),
        };

        let Some(trigger) = self
            .registry
            .get_trigger(&automation.trigger_service_id, automation.trigger_id)
        else {
            let outcome = Evaluation::Skipped(SkipReason::UnknownTrigger {
                service: automation.trigger_service_id.clone(),
                id: automation.trigger_id,
            });
            return self.log_unresolved(user, automation, outcome);
        };

        let ctx = CheckContext {
            automation_id: automation.id,
            user,
            params: &automation.trigger_params,
            checkpoint: &automation.trigger_check_data,
            token: &trigger_token,
        };
        let outcome = match guarded(self.config.call_timeout, trigger.check(&ctx)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    user_id = %user.id,
                    automation_id = %automation.id,
                    service = %automation.trigger_service_id,
                    trigger_id = automation.trigger_id,
                    error = %e,
                    "Trigger check failed"
                );
                return Evaluation::Failed(Stage::Check);
            }
        };

        let Some(event) = outcome.event else {
            if let Some(checkpoint) = outcome.checkpoint {
                if !self.persist_checkpoint(user, automation, checkpoint).await {
                    return Evaluation::Failed(Stage::Checkpoint);
                }
            }
            debug!(user_id = %user.id, automation_id = %automation.id, "No new event");
            return Evaluation::Idle;
        };

        info!(
            user_id = %user.id,
            automation_id = %automation.id,
            service = %automation.trigger_service_id,
            event = %event.text,
            "Trigger fired"
        );

        let (reaction, reaction_token) = match self.resolve_reaction(user, automation).await {
            Ok(resolved) => resolved,
            Err(unresolved) => {
                match (self.config.on_unresolved_reaction, outcome.checkpoint) {
                    (UnresolvedReactionPolicy::Advance, Some(checkpoint)) => {
                        self.persist_checkpoint(user, automation, checkpoint).await;
                    }
                    (UnresolvedReactionPolicy::Retain, Some(_)) => {
                        debug!(
                            user_id = %user.id,
                            automation_id = %automation.id,
                            "Checkpoint retained until the reaction side resolves"
                        );
                    }
                    (_, None) => {}
                }
                return self.log_unresolved(user, automation, unresolved);
            }
        };

        if let Some(checkpoint) = outcome.checkpoint {
            if !self.persist_checkpoint(user, automation, checkpoint).await {
                warn!(
                    user_id = %user.id,
                    automation_id = %automation.id,
                    "Reaction withheld: checkpoint was not persisted"
                );
                return Evaluation::Failed(Stage::Checkpoint);
            }
        }

        let ctx = ReactionContext::new(
            user,
            &automation.reaction_params,
            &reaction_token,
            &event,
            reaction.fields(),
        );
        match guarded(self.config.call_timeout, reaction.execute(&ctx)).await {
            Ok(()) => {
                info!(
                    user_id = %user.id,
                    automation_id = %automation.id,
                    service = %automation.reaction_service_id,
                    reaction_id = automation.reaction_id,
                    "Reaction executed"
                );
                Evaluation::Fired
            }
            Err(e) => {
                warn!(
                    user_id = %user.id,
                    automation_id = %automation.id,
                    service = %automation.reaction_service_id,
                    reaction_id = automation.reaction_id,
                    error = %e,
                    "Reaction failed"
                );
                Evaluation::Failed(Stage::Reaction)
            }
        }
    }

    async fn resolve_token(&self, user: &User, service: &str) -> Result<OAuthToken, Evaluation> {
        match self.gateway.service_token(user.id, service).await {
            Ok(Some(token)) if token.is_expired() => Err(Evaluation::Skipped(SkipReason::ExpiredToken {
                service: service.to_string(),
            })),
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(Evaluation::Skipped(SkipReason::MissingToken {
                service: service.to_string(),
            })),
            Err(e) => {
                warn!(user_id = %user.id, service = %service, error = %e, "Failed to load service token");
                Err(Evaluation::Failed(Stage::Token))
            }
        }
    }

    async fn resolve_reaction(
        &self,
        user: &User,
        automation: &Automation,
    ) -> Result<(Arc<dyn Reaction>, OAuthToken), Evaluation> {
        let token = self.resolve_token(user, &automation.reaction_service_id).await?;
        let reaction = self
            .registry
            .get_reaction(&automation.reaction_service_id, automation.reaction_id)
            .ok_or_else(|| {
                Evaluation::Skipped(SkipReason::UnknownReaction {
                    service: automation.reaction_service_id.clone(),
                    id: automation.reaction_id,
                })
            })?;
        Ok((reaction, token))
    }

    /// Writes the checkpoint; `true` only when exactly this row was updated.
    async fn persist_checkpoint(&self, user: &User, automation: &Automation, checkpoint: Value) -> bool {
        match self
            .gateway
            .update_automation(user.id, automation.id, AutomationUpdate::checkpoint(checkpoint))
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                debug!(
                    user_id = %user.id,
                    automation_id = %automation.id,
                    "Automation no longer exists, checkpoint dropped"
                );
                false
            }
            Err(e) => {
                warn!(
                    user_id = %user.id,
                    automation_id = %automation.id,
                    error = %e,
                    "Failed to persist checkpoint"
                );
                false
            }
        }
    }

    fn log_unresolved(&self, user: &User, automation: &Automation, outcome: Evaluation) -> Evaluation {
        if let Evaluation::Skipped(reason) = &outcome {
            warn!(
                user_id = %user.id,
                automation_id = %automation.id,
                reason = %reason,
                "Automation skipped"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guarded_passes_value_through() {
        let value = guarded(Duration::from_secs(1), async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_guarded_keeps_error_context() {
        let err = guarded::<(), _>(Duration::from_secs(1), async {
            Err(anyhow::anyhow!("connection reset").context("GitHub request failed"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CallError::Failed(_)));
        assert_eq!(err.to_string(), "GitHub request failed: connection reset");
    }

    #[tokio::test]
    async fn test_guarded_times_out() {
        let err = guarded::<(), _>(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CallError::Timeout(_)));
    }

    async fn explode() -> anyhow::Result<()> {
        panic!("remote payload was not an array");
    }

    #[tokio::test]
    async fn test_guarded_captures_panic() {
        let err = guarded(Duration::from_secs(1), explode()).await.unwrap_err();
        match err {
            CallError::Panicked(msg) => assert_eq!(msg, "remote payload was not an array"),
            other => panic!("expected panic capture, got {:?}", other),
        }
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::UnknownReaction {
            service: "github".to_string(),
            id: 9,
        };
        assert_eq!(reason.to_string(), "unknown reaction `github/9`");
    }
}
