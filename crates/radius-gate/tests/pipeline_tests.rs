//! Integration tests for radius-gate
//!
//! These tests verify end-to-end functionality including:
//! - Secret resolution from the data directory
//! - Pre-authorization verdicts and reject suppression
//! - Plugin loading from configuration
//! - The UDP proxy against a fake upstream server

use radius_gate::{
    handle_auth, AccountingSink, BackgroundQueue, ClientPacket, Config, ConfigError, Context,
    Module, ModuleRegistry, PluginError, PostAuthCheck, PreAuthCheck, ProxyServer, ReasonCode,
    SecretStore,
};
use radius_proto::{
    calculate_accounting_request_authenticator, calculate_response_authenticator,
    sign_message_authenticator, verify_response_authenticator, Attribute, AttributeType, Code,
    Packet,
};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Access-Request signed with Message-Authenticator
fn signed_request(secret: &[u8], identifier: u8, user: &str, mac: &str) -> Vec<u8> {
    let mut packet = Packet::new(Code::AccessRequest, identifier, [identifier; 16]);
    packet.add_attribute(
        Attribute::string(AttributeType::UserName as u8, user)
            .expect("Failed to create User-Name attribute"),
    );
    packet.add_attribute(
        Attribute::string(AttributeType::CallingStationId as u8, mac)
            .expect("Failed to create Calling-Station-Id attribute"),
    );
    packet.add_attribute(
        Attribute::new(AttributeType::MessageAuthenticator as u8, vec![0u8; 16])
            .expect("Failed to create Message-Authenticator attribute"),
    );
    let offset = packet
        .attribute_value_offset(AttributeType::MessageAuthenticator as u8)
        .unwrap();
    let mut bytes = packet.encode().unwrap();
    assert!(sign_message_authenticator(&mut bytes, secret, offset));
    bytes
}

fn accounting_request(secret: &[u8], identifier: u8) -> Vec<u8> {
    let mut packet = Packet::new(Code::AccountingRequest, identifier, [0u8; 16]);
    packet.add_attribute(Attribute::integer(AttributeType::AcctStatusType as u8, 1).unwrap());
    packet.add_attribute(Attribute::string(AttributeType::AcctSessionId as u8, "session").unwrap());
    packet.authenticator = calculate_accounting_request_authenticator(&packet, secret).unwrap();
    packet.encode().unwrap()
}

fn write_secrets(dir: &Path, secrets: &str, clients: Option<&str>) {
    fs::write(dir.join("secrets"), secrets).unwrap();
    if let Some(clients) = clients {
        fs::write(dir.join("clients"), clients).unwrap();
    }
}

fn config_for(dir: &Path) -> Config {
    Config {
        dir: dir.to_path_buf(),
        log: dir.join("log"),
        ..Config::default()
    }
}

fn addr(s: &str) -> Option<SocketAddr> {
    Some(s.parse().unwrap())
}

/// Pre/post check with a fixed verdict that counts its invocations
struct Verdict {
    name: &'static str,
    allow: bool,
    calls: AtomicUsize,
}

impl Verdict {
    fn new(name: &'static str, allow: bool) -> Arc<Self> {
        Arc::new(Verdict {
            name,
            allow,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Module for Verdict {
    fn name(&self) -> &str {
        self.name
    }
    fn as_pre_auth(self: Arc<Self>) -> Option<Arc<dyn PreAuthCheck>> {
        Some(self)
    }
}

impl PreAuthCheck for Verdict {
    fn pre(&self, _packet: &Arc<ClientPacket>) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.allow
    }
}

/// Post-authorization veto
struct DenyReplies;

impl Module for DenyReplies {
    fn name(&self) -> &str {
        "deny-replies"
    }
    fn as_post_auth(self: Arc<Self>) -> Option<Arc<dyn PostAuthCheck>> {
        Some(self)
    }
}

impl PostAuthCheck for DenyReplies {
    fn post(&self, _packet: &Arc<ClientPacket>) -> bool {
        false
    }
}

#[derive(Default)]
struct CountingSink {
    seen: AtomicUsize,
}

impl Module for CountingSink {
    fn name(&self) -> &str {
        "counting"
    }
    fn as_accounting(self: Arc<Self>) -> Option<Arc<dyn AccountingSink>> {
        Some(self)
    }
}

impl AccountingSink for CountingSink {
    fn account(&self, _packet: &Arc<ClientPacket>) {
        self.seen.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_single_secret_from_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    write_secrets(dir.path(), "# local\n127.0.0.1 topsecret\n", None);
    let ctx = Context::from_config(&config_for(dir.path()), BackgroundQueue::spawn()).unwrap();

    let ok = ctx.pre_authorize(signed_request(b"topsecret", 1, "alice", "aa"), addr("10.0.0.5:5000"));
    assert_eq!(ok.reason, ReasonCode::Success);

    let written = AtomicUsize::new(0);
    let write = |_: &[u8]| {
        written.fetch_add(1, Ordering::SeqCst);
    };
    let authorized = handle_auth(
        Context::pre_authorize,
        &ctx,
        signed_request(b"wrong", 2, "alice", "aa"),
        addr("10.0.0.5:5000"),
        Some(&write),
    );
    assert!(!authorized);
    assert_eq!(written.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_mapped_secrets_from_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    write_secrets(
        dir.path(),
        "127.0.0.1 ignored\n",
        Some("10.0.0. sharedA\n0.0.0.0 fallback\n"),
    );
    let ctx = Context::from_config(&config_for(dir.path()), BackgroundQueue::spawn()).unwrap();

    assert_eq!(ctx.secrets().resolve(addr("10.0.0.9:1")).unwrap(), b"sharedA");
    assert_eq!(ctx.secrets().resolve(addr("192.168.1.1:1")).unwrap(), b"fallback");

    let near = ctx.pre_authorize(signed_request(b"sharedA", 1, "a", "b"), addr("10.0.0.9:1"));
    assert_eq!(near.reason, ReasonCode::Success);

    // A mapped client may still use the catch-all secret
    let wild = ctx.pre_authorize(signed_request(b"fallback", 1, "a", "b"), addr("10.0.0.9:1"));
    assert_eq!(wild.reason, ReasonCode::Success);

    let far = ctx.pre_authorize(signed_request(b"sharedA", 1, "a", "b"), addr("192.168.1.1:1"));
    assert_eq!(far.reason, ReasonCode::BadSecret);

    // The default secret no longer applies once mappings exist
    let local = ctx.pre_authorize(signed_request(b"ignored", 1, "a", "b"), addr("192.168.1.1:1"));
    assert_eq!(local.reason, ReasonCode::BadSecret);
}

#[test]
fn test_rejecting_and_accepting_modules_both_run() {
    let reject = Verdict::new("reject", false);
    let accept = Verdict::new("accept", true);
    let mut registry = ModuleRegistry::new();
    registry.register(reject.clone());
    registry.register(accept.clone());
    let ctx = Context::new(SecretStore::single("topsecret"), registry);

    let auth = ctx.pre_authorize(signed_request(b"topsecret", 1, "a", "b"), addr("10.0.0.5:1"));

    assert_eq!(auth.reason, ReasonCode::PreAuthRejected);
    assert_eq!(reject.calls(), 1);
    assert_eq!(accept.calls(), 1);
}

#[test]
fn test_undecodable_accounting_reaches_no_sink() {
    let sink = Arc::new(CountingSink::default());
    let mut registry = ModuleRegistry::new();
    registry.register(sink.clone());
    let ctx = Context::new(SecretStore::single("s"), registry);

    ctx.account(&Arc::new(ClientPacket::new(vec![4, 1, 0, 5, 0], addr("10.0.0.5:1"))));
    assert_eq!(sink.seen.load(Ordering::SeqCst), 0);

    ctx.account(&Arc::new(ClientPacket::new(accounting_request(b"s", 1), addr("10.0.0.5:1"))));
    assert_eq!(sink.seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_plugins_from_config() {
    let dir = tempfile::tempdir().unwrap();
    write_secrets(dir.path(), "127.0.0.1 s\n", None);

    let mut config = config_for(dir.path());
    config.plugins = vec!["usermac".to_string(), "log".to_string()];
    config.disable.trace = vec!["log".to_string()];
    config.disable.accounting = vec!["log".to_string()];
    let ctx = Context::from_config(&config, BackgroundQueue::spawn()).unwrap();

    assert_eq!(ctx.registry().modules().len(), 2);
    assert_eq!(ctx.registry().pre_auths().len(), 2);
    assert_eq!(ctx.registry().post_auths().len(), 1);
    assert!(ctx.registry().traces().is_empty());
    assert!(ctx.registry().accountings().is_empty());

    config.plugins.push("nonesuch".to_string());
    assert!(matches!(
        Context::from_config(&config, BackgroundQueue::spawn()),
        Err(ConfigError::Plugin(PluginError::Unknown(_)))
    ));
}

#[tokio::test]
async fn test_missing_secrets_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Context::from_config(&config_for(dir.path()), BackgroundQueue::spawn()),
        Err(ConfigError::Secrets(_))
    ));
}

/// Upstream stand-in answering every request with `reply_code`
async fn fake_upstream(secret: &'static [u8], reply_code: Code) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let local = socket.local_addr().unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((len, src)) = socket.recv_from(&mut buf).await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let Ok(request) = Packet::decode(&buf[..len]) else {
                continue;
            };
            let mut reply = request.response(reply_code);
            reply.authenticator =
                calculate_response_authenticator(&reply, &request.authenticator, secret).unwrap();
            let _ = socket.send_to(&reply.encode().unwrap(), src).await;
        }
    });

    (local, received)
}

async fn start_proxy(upstream: SocketAddr, accounting: bool, ctx: Context) -> SocketAddr {
    let server = ProxyServer::new("127.0.0.1:0".parse().unwrap(), upstream, accounting, Arc::new(ctx))
        .await
        .expect("Failed to create proxy");
    let proxy_addr = server.local_addr().expect("Failed to get proxy address");
    tokio::spawn(async move {
        server.run().await.expect("Proxy failed");
    });
    proxy_addr
}

/// Send `bytes` and wait briefly for an answer
async fn exchange(bytes: &[u8], proxy: SocketAddr, wait: Duration) -> Option<Packet> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(bytes, proxy).await.unwrap();
    let mut buf = [0u8; 4096];
    let (len, _) = timeout(wait, socket.recv_from(&mut buf)).await.ok()?.ok()?;
    Some(Packet::decode(&buf[..len]).unwrap())
}

#[tokio::test]
async fn test_proxy_relays_authorized_request() {
    let (upstream, received) = fake_upstream(b"topsecret", Code::AccessAccept).await;
    let ctx = Context::new(SecretStore::single("topsecret"), ModuleRegistry::new());
    let proxy = start_proxy(upstream, false, ctx).await;

    let reply = exchange(&signed_request(b"topsecret", 11, "alice", "aa"), proxy, Duration::from_secs(5))
        .await
        .expect("reply relayed");

    assert_eq!(reply.code, Code::AccessAccept);
    assert_eq!(reply.identifier, 11);
    assert!(verify_response_authenticator(&reply, &[11u8; 16], b"topsecret"));
    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_proxy_rejects_without_forwarding() {
    let (upstream, received) = fake_upstream(b"topsecret", Code::AccessAccept).await;
    let mut registry = ModuleRegistry::new();
    registry.register(Verdict::new("reject", false));
    let ctx = Context::new(SecretStore::single("topsecret"), registry);
    let proxy = start_proxy(upstream, false, ctx).await;

    let reply = exchange(&signed_request(b"topsecret", 12, "bob", "bb"), proxy, Duration::from_secs(5))
        .await
        .expect("reject sent");

    assert_eq!(reply.code, Code::AccessReject);
    assert!(verify_response_authenticator(&reply, &[12u8; 16], b"topsecret"));
    assert_eq!(received.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_proxy_is_silent_on_bad_secret() {
    let (upstream, received) = fake_upstream(b"topsecret", Code::AccessAccept).await;
    let ctx = Context::new(SecretStore::single("topsecret"), ModuleRegistry::new());
    let proxy = start_proxy(upstream, false, ctx).await;

    let reply = exchange(&signed_request(b"guess", 13, "eve", "ee"), proxy, Duration::from_millis(500)).await;

    assert!(reply.is_none());
    assert_eq!(received.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_proxy_post_authorization_reject() {
    let (upstream, received) = fake_upstream(b"topsecret", Code::AccessAccept).await;
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(DenyReplies));
    let ctx = Context::new(SecretStore::single("topsecret"), registry);
    let proxy = start_proxy(upstream, false, ctx).await;

    let reply = exchange(&signed_request(b"topsecret", 14, "carol", "cc"), proxy, Duration::from_secs(5))
        .await
        .expect("reject sent");

    // The upstream accepted, the proxy turned it into a reject for the original request
    assert_eq!(received.load(Ordering::SeqCst), 1);
    assert_eq!(reply.code, Code::AccessReject);
    assert_eq!(reply.identifier, 14);
    assert!(verify_response_authenticator(&reply, &[14u8; 16], b"topsecret"));
}

#[tokio::test]
async fn test_proxy_accounting_mode() {
    let (upstream, received) = fake_upstream(b"acct", Code::AccountingResponse).await;
    let sink = Arc::new(CountingSink::default());
    let mut registry = ModuleRegistry::new();
    registry.register(sink.clone());
    let ctx = Context::new(SecretStore::single("acct"), registry);
    let proxy = start_proxy(upstream, true, ctx).await;

    let reply = exchange(&accounting_request(b"acct", 21), proxy, Duration::from_secs(5))
        .await
        .expect("accounting response relayed");

    assert_eq!(reply.code, Code::AccountingResponse);
    assert_eq!(reply.identifier, 21);
    assert_eq!(sink.seen.load(Ordering::SeqCst), 1);
    assert_eq!(received.load(Ordering::SeqCst), 1);
}
