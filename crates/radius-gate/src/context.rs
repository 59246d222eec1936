//! Authorization pipeline
//!
//! A [`Context`] owns the secret table and the module registry and runs every
//! packet through the same sequence:
//!
//! ```text
//! Received -> Decoded -> SecretChecked -> CapabilityChecked -> Traced -> Resolved
//! ```
//!
//! Only a failed secret check short-circuits (capability checks are skipped);
//! capability dispatch itself never stops early, so every module sees every
//! packet it is registered for.

use crate::background::BackgroundQueue;
use crate::config::{Config, ConfigError};
use crate::module::{Module, PluginContext, TraceType};
use crate::packet::ClientPacket;
use crate::plugins;
use crate::registry::ModuleRegistry;
use crate::secrets::{SecretError, SecretStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one authorization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    Success,
    BadSecret,
    PreAuthRejected,
    PostAuthRejected,
}

impl ReasonCode {
    pub fn is_success(self) -> bool {
        self == ReasonCode::Success
    }

    /// Record `failure` unless a failure is already recorded
    fn or_failure(self, failure: ReasonCode) -> ReasonCode {
        if self.is_success() {
            failure
        } else {
            self
        }
    }
}

/// Which veto point a pass runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Request just received from a client; the secret is checked
    Pre,
    /// Upstream answer on its way back to the client
    Post,
}

impl AuthMode {
    fn rejection(self) -> ReasonCode {
        match self {
            AuthMode::Pre => ReasonCode::PreAuthRejected,
            AuthMode::Post => ReasonCode::PostAuthRejected,
        }
    }
}

/// Packet and verdict of one pass
#[derive(Debug)]
pub struct Authorization {
    pub packet: Arc<ClientPacket>,
    pub reason: ReasonCode,
}

impl Authorization {
    pub fn is_authorized(&self) -> bool {
        self.reason.is_success()
    }
}

/// Server operating context, immutable once built
///
/// Reloading configuration means building a new `Context`; an in-use one is
/// never mutated.
#[derive(Debug)]
pub struct Context {
    debug: bool,
    no_reject: bool,
    require_message_authenticator: bool,
    secrets: SecretStore,
    registry: ModuleRegistry,
}

impl Context {
    pub fn new(secrets: SecretStore, registry: ModuleRegistry) -> Self {
        Context {
            debug: false,
            no_reject: false,
            require_message_authenticator: false,
            secrets,
            registry,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Never answer a failed authorization with Access-Reject
    pub fn with_no_reject(mut self, no_reject: bool) -> Self {
        self.no_reject = no_reject;
        self
    }

    /// Treat Access-Requests without Message-Authenticator as bad-secret
    pub fn with_require_message_authenticator(mut self, require: bool) -> Self {
        self.require_message_authenticator = require;
        self
    }

    /// Build a context from configuration: secrets from `dir`, plugins by name
    ///
    /// Any unreadable secret source or failing plugin setup is fatal.
    pub fn from_config(config: &Config, background: BackgroundQueue) -> Result<Self, ConfigError> {
        let secrets = SecretStore::load(&config.dir)?;

        let mut base = PluginContext::new(
            &config.dir,
            &config.log,
            config.instance_name(),
            background,
        );
        base.debug = config.debug;
        base.cache = config.cache;

        let mut registry = ModuleRegistry::new();
        for name in &config.plugins {
            let disabled = config.disable.for_plugin(name);
            let module = plugins::load_plugin(name, base.scoped(disabled.clone()))?;
            let capabilities = registry.register_except(module, &disabled);
            info!(
                plugin = %name,
                capabilities = ?capabilities.iter().map(|c| c.name()).collect::<Vec<_>>(),
                "Loaded plugin"
            );
        }

        Ok(Context::new(secrets, registry)
            .with_debug(config.debug)
            .with_no_reject(config.no_reject)
            .with_require_message_authenticator(config.require_message_authenticator))
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn no_reject(&self) -> bool {
        self.no_reject
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Pre-authorize a request just received from a client
    pub fn pre_authorize(&self, bytes: Vec<u8>, addr: Option<SocketAddr>) -> Authorization {
        self.do_authing(bytes, addr, AuthMode::Pre)
    }

    /// Post-authorize an upstream answer destined for the client at `addr`
    pub fn post_authorize(&self, bytes: Vec<u8>, addr: Option<SocketAddr>) -> Authorization {
        self.do_authing(bytes, addr, AuthMode::Post)
    }

    fn do_authing(&self, bytes: Vec<u8>, addr: Option<SocketAddr>, mode: AuthMode) -> Authorization {
        let packet = Arc::new(ClientPacket::new(bytes, addr));
        let reason = self.authorize(&packet, mode);
        Authorization { packet, reason }
    }

    /// Run one pass over an already wrapped packet
    pub fn authorize(&self, packet: &Arc<ClientPacket>, mode: AuthMode) -> ReasonCode {
        let receiving = mode == AuthMode::Pre;
        let authing = match mode {
            AuthMode::Pre => !self.registry.pre_auths().is_empty(),
            AuthMode::Post => !self.registry.post_auths().is_empty(),
        };
        let tracing = !self.registry.traces().is_empty();

        if !(receiving || authing || tracing) {
            return ReasonCode::Success;
        }

        // EAP conversations can carry packets this layer cannot parse; that
        // alone is no reason to refuse them
        if !self.decode(packet) {
            return ReasonCode::Success;
        }

        let mut reason = ReasonCode::Success;
        if receiving {
            match self.check_secret(packet) {
                Ok(secret) => packet.bind_secret(secret),
                Err(e) => {
                    warn!(
                        client_addr = ?packet.client_addr(),
                        error = %e,
                        "Invalid radius secret"
                    );
                    reason = ReasonCode::BadSecret;
                }
            }
        }
        // Unverified packets are keyed to the most specific secret
        packet.bind_secret(self.fallback_secret(packet));

        if authing && reason.is_success() {
            let failed = match mode {
                AuthMode::Pre => check_modules(self.registry.pre_auths(), |m| m.pre(packet)),
                AuthMode::Post => check_modules(self.registry.post_auths(), |m| m.post(packet)),
            };
            if failed {
                reason = reason.or_failure(mode.rejection());
            }
        }

        if tracing {
            for module in self.registry.traces() {
                module.trace(TraceType::RequestReceived, packet);
            }
        }

        reason
    }

    /// Hand an Accounting-Request to every accounting sink
    ///
    /// Packets that fail to decode are dropped without dispatch.
    pub fn account(&self, packet: &Arc<ClientPacket>) {
        if !self.decode(packet) {
            return;
        }
        packet.bind_secret(self.fallback_secret(packet));
        for module in self.registry.accountings() {
            module.account(packet);
        }
    }

    /// Reload every loaded module's internal state
    pub fn reload_modules(&self) {
        self.registry.reload_all();
    }

    /// Log the secret configuration (never the secret values) when debugging
    pub fn debug_dump(&self) {
        if !self.debug {
            return;
        }
        debug!(
            has_default = self.secrets.default_secret().is_some(),
            mapped = self.secrets.is_mapped(),
            "Secret configuration"
        );
        for prefix in self.secrets.prefixes() {
            debug!(prefix = %prefix, "Client mapping");
        }
        debug!(registry = ?self.registry, "Module registry");
    }

    /// True when a decoded packet is available
    fn decode(&self, packet: &ClientPacket) -> bool {
        match packet.decode() {
            Ok(_) => true,
            Err(e) => {
                debug!(client_addr = ?packet.client_addr(), error = %e, "Unable to decode packet");
                false
            }
        }
    }

    /// Most specific secret for the sender, else the default, else empty
    fn fallback_secret(&self, packet: &ClientPacket) -> &[u8] {
        self.secrets
            .resolve(packet.client_addr())
            .ok()
            .or_else(|| self.secrets.default_secret())
            .unwrap_or_default()
    }

    /// First candidate secret the packet verifies against
    fn check_secret(&self, packet: &ClientPacket) -> Result<&[u8], SecretError> {
        let mut failure = SecretError::Mismatch;
        for secret in self.secrets.candidates(packet.client_addr())? {
            match packet.verify_secret(secret, self.require_message_authenticator) {
                Ok(()) => return Ok(secret),
                Err(e) => failure = e,
            }
        }
        Err(failure)
    }
}

/// Run every check; true if any of them failed
fn check_modules<M, F>(modules: &[Arc<M>], check: F) -> bool
where
    M: Module + ?Sized,
    F: Fn(&M) -> bool,
{
    let mut failure = false;
    for module in modules {
        if check(module.as_ref()) {
            continue;
        }
        failure = true;
        debug!(module = module.name(), "Unauthorized");
    }
    failure
}
