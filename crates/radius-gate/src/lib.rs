//! Authorizing RADIUS Proxy
//!
//! This crate sits between RADIUS clients (NAS devices) and an upstream
//! RADIUS server. Every request runs through a pipeline of pluggable modules
//! before it is forwarded, and every upstream answer runs through it again
//! before it is relayed back.
//!
//! # Features
//!
//! - Per-client shared secrets by textual address prefix
//! - Pre-authorization, post-authorization, accounting and tracing plugins
//! - Access-Reject synthesis, suppressed for bad secrets
//! - Background queue for plugin side effects
//! - JSON configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_gate::{BackgroundQueue, Config, Context, ProxyServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.json")?;
//!     let ctx = Context::from_config(&config, BackgroundQueue::spawn())?;
//!
//!     let server = ProxyServer::from_config(&config, Arc::new(ctx)).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod background;
pub mod config;
pub mod context;
pub mod module;
pub mod packet;
pub mod plugins;
pub mod registry;
pub mod response;
pub mod secrets;
pub mod server;

pub use audit::{AuditEntry, DatedLog};
pub use background::{BackgroundQueue, JobHandle};
pub use config::{Config, ConfigError, DisableConfig};
pub use context::{AuthMode, Authorization, Context, ReasonCode};
pub use module::{
    AccountingSink, Capability, Module, PluginContext, PluginError, PostAuthCheck, PreAuthCheck,
    TraceSink, TraceType,
};
pub use packet::{ClientPacket, DecodeError};
pub use plugins::load_plugin;
pub use registry::ModuleRegistry;
pub use response::{build_reject, handle_auth, AuthorizePacket, ResponseError};
pub use secrets::{SecretError, SecretStore};
pub use server::{ProxyServer, ServerError};
