//! Connector contract: services, triggers and reactions.
//!
//! A [`ServiceConnector`] bundles one third-party integration: its identity,
//! the OAuth authorize/callback pair, and the [`Trigger`]s and [`Reaction`]s
//! users can bind together into automations.
//!
//! ```text
//!           ServiceConnector ("github")
//!          /          |            \
//!   connect/callback  triggers     reactions
//!                     check()      execute()
//! ```
//!
//! Connectors are registered once at startup and never mutated. All state
//! (tokens, checkpoints) lives in the persistence gateway and is handed to
//! `check`/`execute` through a context.

mod fields;

pub use fields::{FieldFallback, FieldKind, FieldSpec};

use crate::error::AreaError;
use crate::model::{AutomationId, FiredEvent, OAuthToken, User, UserId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Display metadata of a service connector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Unique, lowercase identifier (e.g. "github"); used as the registry key
    /// and as the `service_id` of stored tokens.
    pub id: String,
    pub name: String,
    pub description: String,
    pub color: String,
    pub icon: String,
}

/// One third-party integration.
#[async_trait]
pub trait ServiceConnector: Send + Sync {
    fn info(&self) -> &ServiceInfo;

    fn triggers(&self) -> &[Arc<dyn Trigger>];

    fn reactions(&self) -> &[Arc<dyn Reaction>];

    /// Returns the provider authorization URL the user is redirected to.
    ///
    /// Fails with [`AreaError::Configuration`] when the connector's client
    /// credentials are not configured.
    async fn connect(&self, user_id: UserId) -> Result<String, AreaError>;

    /// Exchanges an authorization code for a token.
    ///
    /// Transport and provider failures come back as
    /// [`AreaError::Authorization`], never as a panic.
    async fn callback(&self, code: &str) -> Result<OAuthToken, AreaError>;

    fn id(&self) -> &str {
        &self.info().id
    }

    fn trigger(&self, id: u32) -> Option<Arc<dyn Trigger>> {
        self.triggers().iter().find(|t| t.id() == id).cloned()
    }

    fn reaction(&self, id: u32) -> Option<Arc<dyn Reaction>> {
        self.reactions().iter().find(|r| r.id() == id).cloned()
    }
}

/// Input handed to [`Trigger::check`].
#[derive(Debug)]
pub struct CheckContext<'a> {
    pub automation_id: AutomationId,
    pub user: &'a User,
    pub params: &'a Value,
    /// Last persisted checkpoint; `null` or `{}` when nothing was seen yet.
    pub checkpoint: &'a Value,
    pub token: &'a OAuthToken,
}

impl CheckContext<'_> {
    /// Deserializes the trigger parameters into the trigger's own type.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.params.clone()).context("Invalid trigger parameters")
    }

    /// Deserializes the checkpoint; a `null` checkpoint yields `T::default()`.
    pub fn checkpoint_as<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if self.checkpoint.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.checkpoint.clone()).context("Invalid trigger checkpoint")
    }
}

/// What a single `check` observed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckOutcome {
    /// New checkpoint to persist; `None` leaves the stored one untouched.
    pub checkpoint: Option<Value>,
    /// The newly observed item, if any.
    pub event: Option<FiredEvent>,
}

impl CheckOutcome {
    /// Nothing new; keep the checkpoint.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Remote state moved forward without anything worth firing.
    pub fn advance(checkpoint: impl Serialize) -> Result<Self> {
        Ok(Self {
            checkpoint: Some(serde_json::to_value(checkpoint).context("Failed to encode checkpoint")?),
            event: None,
        })
    }

    /// Fire `event` and record `checkpoint` as the new last-known state.
    pub fn fire(checkpoint: impl Serialize, event: FiredEvent) -> Result<Self> {
        Ok(Self {
            checkpoint: Some(serde_json::to_value(checkpoint).context("Failed to encode checkpoint")?),
            event: Some(event),
        })
    }

    pub fn fired(&self) -> bool {
        self.event.is_some()
    }
}

/// A polling condition on a remote service.
#[async_trait]
pub trait Trigger: Send + Sync {
    fn id(&self) -> u32;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn fields(&self) -> &[FieldSpec];

    /// Compares remote state with the checkpoint.
    ///
    /// Must return an advanced checkpoint whenever remote state moved
    /// forward, including on calls that do not fire, and must return an idle
    /// outcome when called again with identical remote state and the
    /// checkpoint it produced. Errors are logged by the scheduler and count
    /// as "no event".
    async fn check(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome>;
}

/// Input handed to [`Reaction::execute`].
#[derive(Debug)]
pub struct ReactionContext<'a> {
    pub user: &'a User,
    pub params: &'a Value,
    pub token: &'a OAuthToken,
    pub event: &'a FiredEvent,
    fields: &'a [FieldSpec],
}

impl<'a> ReactionContext<'a> {
    pub fn new(
        user: &'a User,
        params: &'a Value,
        token: &'a OAuthToken,
        event: &'a FiredEvent,
        fields: &'a [FieldSpec],
    ) -> Self {
        Self {
            user,
            params,
            token,
            event,
            fields,
        }
    }

    /// Raw string value of a parameter; empty when missing or null.
    pub fn param(&self, id: &str) -> String {
        match self.params.get(id) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Parameter value, or the declared fallback of that field when the value
    /// is empty. Whitespace counts as a value.
    pub fn param_or_fallback(&self, id: &str) -> String {
        let value = self.param(id);
        if !value.is_empty() {
            return value;
        }
        let fallback = self
            .fields
            .iter()
            .find(|f| f.id == id)
            .and_then(|f| f.fallback);
        match fallback {
            Some(FieldFallback::EventText) => self.event.text.clone(),
            None => value,
        }
    }
}

/// A side-effecting action on a remote service.
#[async_trait]
pub trait Reaction: Send + Sync {
    fn id(&self) -> u32;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn fields(&self) -> &[FieldSpec];

    /// Performs the action. Failures are logged by the scheduler and never
    /// retried.
    async fn execute(&self, ctx: &ReactionContext<'_>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> User {
        User {
            id: UserId(1),
            email: "alice@example.com".to_string(),
            firstname: "Alice".to_string(),
            lastname: "Liddell".to_string(),
        }
    }

    #[derive(Deserialize, Default, Debug, PartialEq)]
    struct Seen {
        #[serde(rename = "lastId")]
        last_id: Option<u64>,
    }

    #[test]
    fn test_checkpoint_as_null_is_default() {
        let user = user();
        let token = OAuthToken::bearer("t");
        let params = json!({});
        let checkpoint = Value::Null;
        let ctx = CheckContext {
            automation_id: AutomationId(1),
            user: &user,
            params: &params,
            checkpoint: &checkpoint,
            token: &token,
        };
        assert_eq!(ctx.checkpoint_as::<Seen>().unwrap(), Seen::default());

        let checkpoint = json!({"lastId": 3});
        let ctx = CheckContext {
            checkpoint: &checkpoint,
            ..ctx
        };
        assert_eq!(ctx.checkpoint_as::<Seen>().unwrap().last_id, Some(3));
    }

    #[test]
    fn test_checkpoint_as_rejects_malformed() {
        let user = user();
        let token = OAuthToken::bearer("t");
        let params = json!({});
        let checkpoint = json!({"lastId": "not-a-number"});
        let ctx = CheckContext {
            automation_id: AutomationId(1),
            user: &user,
            params: &params,
            checkpoint: &checkpoint,
            token: &token,
        };
        assert!(ctx.checkpoint_as::<Seen>().is_err());
    }

    #[test]
    fn test_param_fallback_is_per_field() {
        let user = user();
        let token = OAuthToken::bearer("t");
        let event = FiredEvent::new("New commit: fix", json!({}));
        let params = json!({"title": "", "repository_name": "", "count": 3});
        let fields = vec![
            FieldSpec::text("title", "Title", "Issue title").with_fallback(FieldFallback::EventText),
            FieldSpec::text("repository_name", "Repository", "Target repository"),
        ];
        let ctx = ReactionContext::new(&user, &params, &token, &event, &fields);

        assert_eq!(ctx.param_or_fallback("title"), "New commit: fix");
        assert_eq!(ctx.param_or_fallback("repository_name"), "");
        assert_eq!(ctx.param_or_fallback("missing"), "");
        assert_eq!(ctx.param("count"), "3");
    }

    #[test]
    fn test_param_keeps_user_value() {
        let user = user();
        let token = OAuthToken::bearer("t");
        let event = FiredEvent::new("ignored", json!({}));
        let params = json!({"title": "Custom"});
        let fields =
            vec![FieldSpec::text("title", "Title", "Issue title").with_fallback(FieldFallback::EventText)];
        let ctx = ReactionContext::new(&user, &params, &token, &event, &fields);
        assert_eq!(ctx.param_or_fallback("title"), "Custom");
    }

    #[test]
    fn test_whitespace_is_not_empty() {
        let user = user();
        let token = OAuthToken::bearer("t");
        let event = FiredEvent::new("New commit: fix", json!({}));
        let params = json!({"body": "  ", "title": null});
        let fields = vec![
            FieldSpec::text("body", "Body", "File content").with_fallback(FieldFallback::EventText),
            FieldSpec::text("title", "Title", "Issue title").with_fallback(FieldFallback::EventText),
        ];
        let ctx = ReactionContext::new(&user, &params, &token, &event, &fields);

        assert_eq!(ctx.param_or_fallback("body"), "  ");
        assert_eq!(ctx.param_or_fallback("title"), "New commit: fix");
    }

    #[test]
    fn test_outcome_constructors() {
        assert!(!CheckOutcome::idle().fired());
        assert!(CheckOutcome::idle().checkpoint.is_none());

        let advanced = CheckOutcome::advance(json!({"knownBranches": ["main"]})).unwrap();
        assert!(!advanced.fired());
        assert_eq!(advanced.checkpoint, Some(json!({"knownBranches": ["main"]})));

        let fired = CheckOutcome::fire(
            json!({"lastCommitSha": "abc"}),
            FiredEvent::new("fix", json!({"sha": "abc"})),
        )
        .unwrap();
        assert!(fired.fired());
    }
}
