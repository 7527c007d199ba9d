//! Persistence gateway: the engine's only view of stored state.
//!
//! The scheduler reads users, automations and tokens through
//! [`PersistenceGateway`] and writes back nothing but checkpoints. OAuth
//! callbacks store tokens through the same trait.

pub mod encryption;
mod sqlite;

pub use sqlite::SqliteGateway;

use crate::error::AreaError;
use crate::model::{Automation, AutomationId, AutomationUpdate, OAuthToken, User, UserId};
use async_trait::async_trait;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Every registered user.
    async fn all_users(&self) -> Result<Vec<User>, AreaError>;

    /// Automations owned by `user_id`, active or not.
    async fn automations(&self, user_id: UserId) -> Result<Vec<Automation>, AreaError>;

    /// Token stored for `(user_id, service_id)`, if the user connected that
    /// service.
    async fn service_token(&self, user_id: UserId, service_id: &str) -> Result<Option<OAuthToken>, AreaError>;

    /// Applies `update` to at most one automation row owned by `user_id`.
    ///
    /// Returns `false` when no such automation exists anymore.
    async fn update_automation(
        &self,
        user_id: UserId,
        automation_id: AutomationId,
        update: AutomationUpdate,
    ) -> Result<bool, AreaError>;

    /// Inserts or replaces the token of `(user_id, service_id)`.
    async fn store_service_token(
        &self,
        user_id: UserId,
        service_id: &str,
        token: &OAuthToken,
    ) -> Result<(), AreaError>;
}
