//! Module registry
//!
//! Holds one ordered sequence of typed handles per capability. Built once at
//! startup and read-only afterwards; dispatch order is registration order.

use crate::module::{
    AccountingSink, Capability, Module, PostAuthCheck, PreAuthCheck, TraceSink,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
    pre_auths: Vec<Arc<dyn PreAuthCheck>>,
    post_auths: Vec<Arc<dyn PostAuthCheck>>,
    accountings: Vec<Arc<dyn AccountingSink>>,
    traces: Vec<Arc<dyn TraceSink>>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("pre_auths", &self.pre_auths.len())
            .field("post_auths", &self.post_auths.len())
            .field("accountings", &self.accountings.len())
            .field("traces", &self.traces.len())
            .finish()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every capability the module advertises
    pub fn register(&mut self, module: Arc<dyn Module>) -> Vec<Capability> {
        self.register_except(module, &HashSet::new())
    }

    /// Register the module's capabilities minus `disabled`
    ///
    /// Returns the capabilities actually registered.
    pub fn register_except(
        &mut self,
        module: Arc<dyn Module>,
        disabled: &HashSet<Capability>,
    ) -> Vec<Capability> {
        let mut registered = Vec::new();
        let enabled = |c: Capability| !disabled.contains(&c);

        if enabled(Capability::PreAuth) {
            if let Some(m) = Arc::clone(&module).as_pre_auth() {
                self.pre_auths.push(m);
                registered.push(Capability::PreAuth);
            }
        }
        if enabled(Capability::PostAuth) {
            if let Some(m) = Arc::clone(&module).as_post_auth() {
                self.post_auths.push(m);
                registered.push(Capability::PostAuth);
            }
        }
        if enabled(Capability::Accounting) {
            if let Some(m) = Arc::clone(&module).as_accounting() {
                self.accountings.push(m);
                registered.push(Capability::Accounting);
            }
        }
        if enabled(Capability::Trace) {
            if let Some(m) = Arc::clone(&module).as_trace() {
                self.traces.push(m);
                registered.push(Capability::Trace);
            }
        }

        debug!(
            module = module.name(),
            capabilities = ?registered.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "Registered module"
        );
        self.modules.push(module);
        registered
    }

    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    pub fn pre_auths(&self) -> &[Arc<dyn PreAuthCheck>] {
        &self.pre_auths
    }

    pub fn post_auths(&self) -> &[Arc<dyn PostAuthCheck>] {
        &self.post_auths
    }

    pub fn accountings(&self) -> &[Arc<dyn AccountingSink>] {
        &self.accountings
    }

    pub fn traces(&self) -> &[Arc<dyn TraceSink>] {
        &self.traces
    }

    /// Reload every registered module once
    pub fn reload_all(&self) {
        for module in &self.modules {
            debug!(module = module.name(), "Reloading module");
            module.reload();
        }
    }
}
