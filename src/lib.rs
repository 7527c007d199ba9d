// Error taxonomy
pub mod error;

// Users, automations, tokens, fired events
pub mod model;

// Service connector, trigger and reaction contracts
pub mod connector;

// Startup registration and catalog of connectors
pub mod registry;

// OAuth authorization code flow
pub mod oauth;

// Persistence gateway and its SQLite adapter
pub mod persistence;

// Polling scheduler
pub mod scheduler;

// TOML and environment configuration
pub mod config;

pub use connector::{
    CheckContext, CheckOutcome, FieldFallback, FieldKind, FieldSpec, Reaction, ReactionContext,
    ServiceConnector, ServiceInfo, Trigger,
};
pub use error::AreaError;
pub use model::{
    Automation, AutomationId, AutomationUpdate, FiredEvent, NewAutomation, OAuthToken, User, UserId,
};
pub use persistence::{PersistenceGateway, SqliteGateway};
pub use registry::ConnectorRegistry;
pub use scheduler::{Scheduler, SchedulerConfig, TickReport, UnresolvedReactionPolicy, POLL_INTERVAL};
