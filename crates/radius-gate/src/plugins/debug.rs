//! Packet dumps at debug level
//!
//! Same dispatch surface as the `log` plugin, but writes through `tracing`
//! instead of files.

use crate::module::{
    AccountingSink, Capability, Module, PluginContext, PluginError, PostAuthCheck, PreAuthCheck,
    TraceSink, TraceType,
};
use crate::packet::ClientPacket;
use crate::plugins::dump::request_entry;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "debug";

#[derive(Default)]
pub struct DebugPlugin {
    instance: String,
}

impl DebugPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn dump(&self, mode: Capability, trace_type: TraceType, packet: &ClientPacket) {
        let entry = request_entry(NAME, mode.name(), packet);
        debug!(
            instance = %self.instance,
            mode = mode.name(),
            trace = trace_type.as_u8(),
            fields = ?entry.fields,
            "Packet dump"
        );
    }
}

impl Module for DebugPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn setup(&mut self, ctx: PluginContext) -> Result<(), PluginError> {
        self.instance = ctx.instance;
        Ok(())
    }

    fn as_pre_auth(self: Arc<Self>) -> Option<Arc<dyn PreAuthCheck>> {
        Some(self)
    }

    fn as_post_auth(self: Arc<Self>) -> Option<Arc<dyn PostAuthCheck>> {
        Some(self)
    }

    fn as_accounting(self: Arc<Self>) -> Option<Arc<dyn AccountingSink>> {
        Some(self)
    }

    fn as_trace(self: Arc<Self>) -> Option<Arc<dyn TraceSink>> {
        Some(self)
    }
}

impl PreAuthCheck for DebugPlugin {
    fn pre(&self, packet: &Arc<ClientPacket>) -> bool {
        self.dump(Capability::PreAuth, TraceType::NoTrace, packet);
        true
    }
}

impl PostAuthCheck for DebugPlugin {
    fn post(&self, packet: &Arc<ClientPacket>) -> bool {
        self.dump(Capability::PostAuth, TraceType::NoTrace, packet);
        true
    }
}

impl AccountingSink for DebugPlugin {
    fn account(&self, packet: &Arc<ClientPacket>) {
        self.dump(Capability::Accounting, TraceType::NoTrace, packet);
    }
}

impl TraceSink for DebugPlugin {
    fn trace(&self, trace_type: TraceType, packet: &Arc<ClientPacket>) {
        self.dump(Capability::Trace, trace_type, packet);
    }
}
