//! Plugin capability contract
//!
//! Every plugin implements [`Module`]. What it takes part in is decided by the
//! capability traits it also implements and advertises through the `as_*`
//! hooks; a plugin that does not advertise a capability is simply never
//! dispatched for it.

use crate::background::BackgroundQueue;
use crate::packet::ClientPacket;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("unknown plugin type {0}")]
    Unknown(String),
    #[error("plugin {name} failed setup: {reason}")]
    Setup { name: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("background job failed: {0}")]
    Background(String),
    #[error("background queue closed")]
    QueueClosed,
    #[error("background queue full")]
    QueueFull,
}

/// Observation points handed to trace sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TraceType {
    NoTrace,
    RequestReceived,
}

impl TraceType {
    pub fn as_u8(self) -> u8 {
        match self {
            TraceType::NoTrace => 0,
            TraceType::RequestReceived => 1,
        }
    }
}

/// Dispatch kinds a plugin can take part in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    PreAuth,
    PostAuth,
    Accounting,
    Trace,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::PreAuth,
        Capability::PostAuth,
        Capability::Accounting,
        Capability::Trace,
    ];

    /// Name used in configuration and log file names
    pub fn name(self) -> &'static str {
        match self {
            Capability::PreAuth => "preauth",
            Capability::PostAuth => "postauth",
            Capability::Accounting => "accounting",
            Capability::Trace => "trace",
        }
    }
}

/// Per-plugin view of the runtime, handed to [`Module::setup`]
///
/// Each plugin receives its own clone; nothing in it is shared mutably
/// except the background queue handle, which is a channel sender.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Data directory (user databases, secrets)
    pub lib: PathBuf,
    /// Directory for dated plugin log files
    pub logs: PathBuf,
    /// Instance identifier, part of every log file name
    pub instance: String,
    pub debug: bool,
    /// Whether plugins may cache lookups between reloads
    pub cache: bool,
    /// Capabilities switched off for this plugin
    pub disabled: HashSet<Capability>,
    pub background: BackgroundQueue,
}

impl PluginContext {
    pub fn new(
        lib: impl Into<PathBuf>,
        logs: impl Into<PathBuf>,
        instance: impl Into<String>,
        background: BackgroundQueue,
    ) -> Self {
        PluginContext {
            lib: lib.into(),
            logs: logs.into(),
            instance: instance.into(),
            debug: false,
            cache: false,
            disabled: HashSet::new(),
            background,
        }
    }

    /// Copy of this context scoped to one plugin
    pub fn scoped(&self, disabled: HashSet<Capability>) -> Self {
        PluginContext {
            disabled,
            ..self.clone()
        }
    }

    pub fn is_disabled(&self, capability: Capability) -> bool {
        self.disabled.contains(&capability)
    }
}

/// Base contract of every plugin
pub trait Module: Send + Sync {
    /// Stable name, used in logs and configuration
    fn name(&self) -> &str;

    /// One-time initialisation before the plugin is registered
    ///
    /// An error aborts startup.
    fn setup(&mut self, _ctx: PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Drop cached state without repeating setup
    fn reload(&self) {}

    fn as_pre_auth(self: Arc<Self>) -> Option<Arc<dyn PreAuthCheck>> {
        None
    }

    fn as_post_auth(self: Arc<Self>) -> Option<Arc<dyn PostAuthCheck>> {
        None
    }

    fn as_accounting(self: Arc<Self>) -> Option<Arc<dyn AccountingSink>> {
        None
    }

    fn as_trace(self: Arc<Self>) -> Option<Arc<dyn TraceSink>> {
        None
    }
}

/// Veto point on request receipt; `false` rejects the request
pub trait PreAuthCheck: Module {
    fn pre(&self, packet: &Arc<ClientPacket>) -> bool;
}

/// Veto point after the upstream server answered; `false` rejects
pub trait PostAuthCheck: Module {
    fn post(&self, packet: &Arc<ClientPacket>) -> bool;
}

/// Record keeping for Accounting-Requests
pub trait AccountingSink: Module {
    fn account(&self, packet: &Arc<ClientPacket>);
}

/// Non-authoritative observation of every decoded request
pub trait TraceSink: Module {
    fn trace(&self, trace_type: TraceType, packet: &Arc<ClientPacket>);
}
