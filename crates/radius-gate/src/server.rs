//! UDP front end
//!
//! Listens for client datagrams, runs them through the [`Context`] and relays
//! what passes to the upstream RADIUS server. Each client gets its own
//! connected upstream socket, so replies find their way back without any
//! rewriting of the request. A client's socket is closed after it has been
//! idle for the session timeout.
//!
//! ```text
//! client --> pre-authorize --> upstream --> post-authorize --> client
//! ```
//!
//! In accounting mode requests are handed to the accounting sinks and always
//! forwarded; replies are relayed untouched.

use crate::config::{Config, ConfigError};
use crate::context::Context;
use crate::packet::ClientPacket;
use crate::response::handle_auth;
use dashmap::DashMap;
use radius_proto::Packet;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default idle time after which a client's upstream socket is closed
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Request authenticators of forwarded requests, by client and identifier
type PendingRequests = DashMap<(SocketAddr, u8), [u8; 16]>;

/// Connected upstream socket of one client
struct UpstreamSession {
    socket: Arc<UdpSocket>,
    last_activity: Instant,
}

impl UpstreamSession {
    fn new(socket: Arc<UdpSocket>) -> Self {
        UpstreamSession {
            socket,
            last_activity: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() >= timeout
    }
}

struct Shared {
    ctx: Arc<Context>,
    socket: Arc<UdpSocket>,
    upstream: SocketAddr,
    accounting: bool,
    session_timeout: Duration,
    clients: DashMap<SocketAddr, UpstreamSession>,
    pending: PendingRequests,
}

/// Authorizing RADIUS proxy
pub struct ProxyServer {
    shared: Arc<Shared>,
}

impl ProxyServer {
    /// Bind the listen socket for `upstream`
    pub async fn new(
        bind_addr: SocketAddr,
        upstream: SocketAddr,
        accounting: bool,
        ctx: Arc<Context>,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        info!(
            bind_addr = %socket.local_addr()?,
            upstream = %upstream,
            accounting = accounting,
            "RADIUS proxy listening"
        );

        Ok(ProxyServer {
            shared: Arc::new(Shared {
                ctx,
                socket: Arc::new(socket),
                upstream,
                accounting,
                session_timeout: DEFAULT_SESSION_TIMEOUT,
                clients: DashMap::new(),
                pending: DashMap::new(),
            }),
        })
    }

    /// Bind using the listen and upstream settings of `config`
    pub async fn from_config(config: &Config, ctx: Arc<Context>) -> Result<Self, ServerError> {
        let server = Self::new(
            config.socket_addr()?,
            config.upstream_addr()?,
            config.accounting,
            ctx,
        )
        .await?;
        Ok(server.with_session_timeout(config.session_timeout()))
    }

    /// Close a client's upstream socket after `session_timeout` without traffic
    ///
    /// Only takes effect before [`run`](Self::run) is called.
    pub fn with_session_timeout(mut self, session_timeout: Duration) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.session_timeout = session_timeout,
            None => warn!("Proxy already running, session timeout unchanged"),
        }
        self
    }

    /// Get the local address the proxy is listening on
    ///
    /// This is useful for testing when binding to port 0 (OS-assigned port)
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.shared.socket.local_addr().map_err(ServerError::from)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.shared.ctx
    }

    /// Receive and relay datagrams until the socket fails
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];

        loop {
            let (len, addr) = self.shared.socket.recv_from(&mut buf).await?;
            let data = buf[..len].to_vec();
            let shared = Arc::clone(&self.shared);

            tokio::spawn(async move {
                if let Err(e) = Shared::handle_client(shared, data, addr).await {
                    debug!(client_addr = %addr, error = %e, "Error handling request");
                }
            });
        }
    }
}

impl Shared {
    async fn handle_client(
        shared: Arc<Shared>,
        data: Vec<u8>,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        if shared.accounting {
            let ctx = Arc::clone(&shared.ctx);
            let packet = Arc::new(ClientPacket::new(data.clone(), Some(addr)));
            if let Err(e) = tokio::task::spawn_blocking(move || ctx.account(&packet)).await {
                warn!(client_addr = %addr, error = %e, "Accounting dispatch failed");
            }
            return Self::forward(&shared, &data, addr).await;
        }

        let authorized = {
            let ctx = Arc::clone(&shared.ctx);
            let socket = Arc::clone(&shared.socket);
            let bytes = data.clone();
            tokio::task::spawn_blocking(move || {
                let write_back = |reject: &[u8]| send_now(&socket, reject, addr);
                handle_auth(Context::pre_authorize, &ctx, bytes, Some(addr), Some(&write_back))
            })
            .await
            .unwrap_or_else(|e| {
                warn!(client_addr = %addr, error = %e, "Pre-authorization failed");
                false
            })
        };

        if !authorized {
            return Ok(());
        }

        if let Some((identifier, authenticator)) = request_header(&data) {
            shared.pending.insert((addr, identifier), authenticator);
        }
        Self::forward(&shared, &data, addr).await
    }

    async fn handle_upstream(shared: Arc<Shared>, reply: Vec<u8>, client: SocketAddr) -> Result<(), ServerError> {
        if shared.accounting {
            shared.socket.send_to(&reply, client).await?;
            return Ok(());
        }

        // Post-authorization sees the reply keyed to the original request, so
        // a reject built from it carries a valid response authenticator
        let mut keyed = reply.clone();
        match reply.get(1).and_then(|id| shared.pending.remove(&(client, *id))) {
            Some((_, authenticator)) if keyed.len() >= Packet::MIN_PACKET_SIZE => {
                keyed[4..Packet::MIN_PACKET_SIZE].copy_from_slice(&authenticator);
            }
            _ => debug!(client_addr = %client, "Reply for unknown request"),
        }

        let authorized = {
            let ctx = Arc::clone(&shared.ctx);
            let socket = Arc::clone(&shared.socket);
            tokio::task::spawn_blocking(move || {
                let write_back = |reject: &[u8]| send_now(&socket, reject, client);
                handle_auth(Context::post_authorize, &ctx, keyed, Some(client), Some(&write_back))
            })
            .await
            .unwrap_or_else(|e| {
                warn!(client_addr = %client, error = %e, "Post-authorization failed");
                false
            })
        };

        if authorized {
            shared.socket.send_to(&reply, client).await?;
        }
        Ok(())
    }

    async fn forward(shared: &Arc<Shared>, data: &[u8], client: SocketAddr) -> Result<(), ServerError> {
        let upstream = Self::upstream_socket(shared, client).await?;
        upstream.send(data).await?;
        debug!(client_addr = %client, upstream = %shared.upstream, "Forwarded request");
        Ok(())
    }

    /// Connected upstream socket for `client`, created on first use
    async fn upstream_socket(shared: &Arc<Shared>, client: SocketAddr) -> Result<Arc<UdpSocket>, ServerError> {
        if let Some(mut session) = shared.clients.get_mut(&client) {
            session.touch();
            return Ok(Arc::clone(&session.socket));
        }

        let local: SocketAddr = if shared.upstream.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(shared.upstream).await?;
        let socket = Arc::new(socket);

        // Another task may have raced us to this client
        let winner = {
            let session = shared
                .clients
                .entry(client)
                .or_insert_with(|| UpstreamSession::new(Arc::clone(&socket)));
            Arc::clone(&session.socket)
        };
        if Arc::ptr_eq(&winner, &socket) {
            debug!(client_addr = %client, "New upstream socket");
            tokio::spawn(Self::relay_replies(Arc::clone(shared), socket, client));
        }
        Ok(winner)
    }

    async fn relay_replies(shared: Arc<Shared>, upstream: Arc<UdpSocket>, client: SocketAddr) {
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
        loop {
            let len = match timeout(shared.session_timeout, upstream.recv(&mut buf)).await {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => {
                    warn!(client_addr = %client, error = %e, "Upstream socket failed");
                    Self::close_session(&shared, &upstream, client, |_| true);
                    return;
                }
                Err(_) => {
                    let idle = shared.session_timeout;
                    if Self::close_session(&shared, &upstream, client, |s| s.is_expired(idle)) {
                        debug!(client_addr = %client, "Upstream session expired");
                        return;
                    }
                    continue;
                }
            };

            if let Some(mut session) = shared.clients.get_mut(&client) {
                session.touch();
            }
            let reply = buf[..len].to_vec();
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                if let Err(e) = Shared::handle_upstream(shared, reply, client).await {
                    debug!(client_addr = %client, error = %e, "Error relaying reply");
                }
            });
        }
    }

    /// Remove the client's session if it still uses `upstream` and `should_close` agrees
    ///
    /// Returns whether the relay for `upstream` should stop, which is also the
    /// case when the session no longer belongs to it. Requests of a closed
    /// session that never got a reply are forgotten.
    fn close_session<F>(shared: &Shared, upstream: &Arc<UdpSocket>, client: SocketAddr, should_close: F) -> bool
    where
        F: FnOnce(&UpstreamSession) -> bool,
    {
        let owned = shared
            .clients
            .get(&client)
            .map(|session| Arc::ptr_eq(&session.socket, upstream))
            .unwrap_or(false);
        if !owned {
            return true;
        }

        let removed = shared
            .clients
            .remove_if(&client, |_, session| {
                Arc::ptr_eq(&session.socket, upstream) && should_close(session)
            })
            .is_some();
        if removed {
            shared.pending.retain(|(addr, _), _| *addr != client);
        }
        removed
    }
}

/// Identifier and request authenticator of a raw request
fn request_header(data: &[u8]) -> Option<(u8, [u8; 16])> {
    let authenticator: [u8; 16] = data.get(4..Packet::MIN_PACKET_SIZE)?.try_into().ok()?;
    Some((data[1], authenticator))
}

/// Best-effort synchronous send from the blocking pool
fn send_now(socket: &UdpSocket, bytes: &[u8], addr: SocketAddr) {
    if let Err(e) = socket.try_send_to(bytes, addr) {
        warn!(client_addr = %addr, error = %e, "Unable to send reject");
    }
}
