//! AREA Connector Hub - built-in service connectors and the polling daemon.
//!
//! The engine (`area` crate) defines the connector contract, the registry,
//! the scheduler and the persistence gateway. This crate supplies the
//! concrete connectors and wires everything into a long-running process.
//!
//! # Architecture
//!
//! ```text
//! Third-party API (GitHub, ...)
//!          ↑
//!     OAuth (user authorizes, token stored encrypted)
//!          ↑
//! ┌─────────────────────────────────────────┐
//! │   ServiceConnector (one per service)     │
//! │  - Triggers: poll remote state           │
//! │  - Reactions: perform remote actions     │
//! └─────────────────────────────────────────┘
//!          ↑
//! ┌─────────────────────────────────────────┐
//! │   Scheduler (every 10s)                  │
//! │  - Load users and active automations     │
//! │  - check → checkpoint → execute          │
//! └─────────────────────────────────────────┘
//!          ↑
//!   Persistence gateway (SQLite)
//! ```
//!
//! # Adding a Connector
//!
//! Implement [`area::ServiceConnector`] with its triggers and reactions under
//! `connectors/`, then register it in [`registry::builtin_registry`].

pub mod connectors;
pub mod registry;

pub use connectors::github::GitHubConnector;
pub use registry::builtin_registry;
