//! User + MAC pre-authorization
//!
//! A request passes when `<lib>/users/<user>.<mac>` exists. Both parts are
//! lower-cased and reduced to `[a-z0-9.]` first, so `AA:BB:CC:DD:EE:FF`
//! becomes `aabbccddeeff`. Every decision is recorded in the dated `audit`
//! log through the background queue.

use crate::audit::{AuditEntry, DatedLog};
use crate::background::BackgroundQueue;
use crate::module::{Module, PluginContext, PluginError, PreAuthCheck};
use crate::packet::ClientPacket;
use dashmap::DashMap;
use radius_proto::{AttributeType, Packet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "usermac";

const USERS_DIR: &str = "users";
const AUDIT_LOG: &str = "audit";

/// Lower-case and keep only `[a-z0-9.]`
pub fn clean(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.')
        .collect()
}

struct Audit {
    log: DatedLog,
    queue: BackgroundQueue,
}

#[derive(Default)]
pub struct UserMac {
    db: PathBuf,
    can_cache: bool,
    /// `<user>.<mac>` to decision, only filled when caching is on
    cache: DashMap<String, bool>,
    audit: Option<Audit>,
}

impl UserMac {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide for `user`/`mac` (already cleaned)
    fn lookup(&self, fqdn: &str) -> bool {
        if self.can_cache {
            if let Some(good) = self.cache.get(fqdn) {
                debug!(object = fqdn, "Object is preauthed");
                return *good;
            }
        }

        let good = self.db.join(fqdn).exists();
        if self.can_cache {
            self.cache.insert(fqdn.to_string(), good);
        }
        good
    }

    fn mark(&self, result: &str, user: &str, mac: &str, packet: &ClientPacket) {
        let Some(audit) = &self.audit else {
            return;
        };
        let Some(request) = packet.packet() else {
            return;
        };

        let entry = AuditEntry::new(NAME, result)
            .with_field("user", user)
            .with_field("mac", mac)
            .with_field("nas", nas_identifier(request))
            .with_field("nas_ip", nas_ip(request))
            .with_field(
                "nas_port",
                request
                    .integer_attribute(AttributeType::NasPort)
                    .unwrap_or(0)
                    .to_string(),
            )
            .with_field("id", request.identifier.to_string())
            .with_field(
                "client",
                packet
                    .host()
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            );

        let log = audit.log.clone();
        audit
            .queue
            .submit(move || log.append(&entry).map_err(PluginError::from));
    }
}

fn nas_identifier(request: &Packet) -> String {
    let nas = request
        .string_attribute(AttributeType::NasIdentifier)
        .map(|n| clean(&n))
        .unwrap_or_default();
    if nas.is_empty() {
        "unknown".to_string()
    } else {
        nas
    }
}

fn nas_ip(request: &Packet) -> String {
    request
        .find_attribute(AttributeType::NasIpAddress as u8)
        .and_then(|attr| attr.as_ipv4().ok())
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "noip".to_string())
}

impl Module for UserMac {
    fn name(&self) -> &str {
        NAME
    }

    fn setup(&mut self, ctx: PluginContext) -> Result<(), PluginError> {
        self.db = ctx.lib.join(USERS_DIR);
        self.can_cache = ctx.cache;
        self.audit = Some(Audit {
            log: DatedLog::new(&ctx.logs, AUDIT_LOG, &ctx.instance),
            queue: ctx.background,
        });
        Ok(())
    }

    fn reload(&self) {
        self.cache.clear();
    }

    fn as_pre_auth(self: Arc<Self>) -> Option<Arc<dyn PreAuthCheck>> {
        Some(self)
    }
}

impl PreAuthCheck for UserMac {
    fn pre(&self, packet: &Arc<ClientPacket>) -> bool {
        let Some(request) = packet.packet() else {
            return false;
        };
        let (Some(user), Some(mac)) = (
            request.string_attribute(AttributeType::UserName),
            request.string_attribute(AttributeType::CallingStationId),
        ) else {
            debug!(client_addr = ?packet.client_addr(), "Missing User-Name or Calling-Station-Id");
            return false;
        };

        let user = clean(&user);
        let mac = clean(&mac);
        let good = self.lookup(&format!("{}.{}", user, mac));

        self.mark(if good { "passed" } else { "failed" }, &user, &mac, packet);
        good
    }
}
