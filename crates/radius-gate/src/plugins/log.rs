//! Request logging
//!
//! Takes part in every dispatch and appends a dump of each request to
//! `<logs>/<mode>.<instance>.<date>`. Never rejects anything.

use crate::audit::DatedLog;
use crate::background::BackgroundQueue;
use crate::module::{
    AccountingSink, Capability, Module, PluginContext, PluginError, PostAuthCheck, PreAuthCheck,
    TraceSink, TraceType,
};
use crate::packet::ClientPacket;
use crate::plugins::dump::request_entry;
use std::path::PathBuf;
use std::sync::Arc;

pub const NAME: &str = "log";

#[derive(Default)]
pub struct LogPlugin {
    logs: PathBuf,
    instance: String,
    queue: Option<BackgroundQueue>,
}

impl LogPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self, mode: Capability, trace_type: TraceType, packet: &ClientPacket) {
        let Some(queue) = &self.queue else {
            return;
        };
        let entry = request_entry(NAME, mode.name(), packet)
            .with_field("trace", trace_type.as_u8().to_string());
        let log = DatedLog::new(&self.logs, mode.name(), &self.instance);
        queue.submit(move || log.append(&entry).map_err(PluginError::from));
    }
}

impl Module for LogPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn setup(&mut self, ctx: PluginContext) -> Result<(), PluginError> {
        self.logs = ctx.logs;
        self.instance = ctx.instance;
        self.queue = Some(ctx.background);
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

impl PreAuthCheck for LogPlugin {
    fn pre(&self, packet: &Arc<ClientPacket>) -> bool {
        self.write(Capability::PreAuth, TraceType::NoTrace, packet);
        true
    }
}

impl PostAuthCheck for LogPlugin {
    fn post(&self, packet: &Arc<ClientPacket>) -> bool {
        self.write(Capability::PostAuth, TraceType::NoTrace, packet);
        true
    }
}

impl AccountingSink for LogPlugin {
    fn account(&self, packet: &Arc<ClientPacket>) {
        self.write(Capability::Accounting, TraceType::NoTrace, packet);
    }
}

impl TraceSink for LogPlugin {
    fn trace(&self, trace_type: TraceType, packet: &Arc<ClientPacket>) {
        self.write(Capability::Trace, trace_type, packet);
    }
}
