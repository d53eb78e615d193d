//! IPC server: listener, per-connection state and event loop wiring.
//!
//! Every accepted connection is registered with the event loop as its own
//! readable source, so a client is only read when it has sent something.
//! Output is queued per client and written after each dispatch round.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction, RegistrationToken};
use tracing::{debug, error, info, warn};

use super::codec::{self, FrameDecoder};
use super::dispatch;
use crate::state::SignBridgeState;

/// Queued output past which broadcast events are dropped (64 KiB).
const MAX_OUTBOX: usize = 65_536;

/// Bytes taken from a client socket per wakeup.
const READ_CHUNK: usize = 8192;

/// Default rate limit: messages per second per client.
pub const DEFAULT_RATE_LIMIT: u32 = 200;

// ── Rate limiting ──────────────────────────────────────────

/// Token bucket holding up to `rate` tokens, refilled continuously at
/// `rate` tokens per second. A rate of zero disables limiting.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate: u32) -> Self {
        Self {
            rate: f64::from(rate),
            tokens: f64::from(rate),
            last_refill: Instant::now(),
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate as u32
    }

    /// Spend one token if one is available.
    pub fn try_take(&mut self) -> bool {
        self.try_take_at(Instant::now())
    }

    fn try_take_at(&mut self, now: Instant) -> bool {
        if self.rate == 0.0 {
            return true;
        }
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.rate);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

// ── Peer credentials ───────────────────────────────────────

/// Identity of the process on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCred {
    pub uid: u32,
    /// Only reported on Linux.
    pub pid: Option<i32>,
}

impl PeerCred {
    #[cfg(target_os = "linux")]
    pub fn of(stream: &UnixStream) -> io::Result<Self> {
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut libc::ucred as *mut libc::c_void,
                &mut len,
            )
        };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            uid: cred.uid,
            pid: Some(cred.pid),
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn of(stream: &UnixStream) -> io::Result<Self> {
        let mut uid: libc::uid_t = 0;
        let mut gid: libc::gid_t = 0;
        let ret = unsafe { libc::getpeereid(stream.as_raw_fd(), &mut uid, &mut gid) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { uid, pid: None })
    }

    /// Whether the peer runs as the user owning this process.
    pub fn is_same_user(&self) -> bool {
        self.uid == unsafe { libc::getuid() }
    }
}

// ── Clients ────────────────────────────────────────────────

/// One connected client.
pub struct IpcClient {
    pub id: u64,
    stream: UnixStream,
    decoder: FrameDecoder,
    /// Encoded frames not yet written.
    pub outbox: Vec<u8>,
    pub authenticated: bool,
    /// Name sent in the hello handshake.
    pub client_name: Option<String>,
    pub peer: Option<PeerCred>,
    pub limiter: TokenBucket,
    /// Readiness source, when registered with an event loop.
    source: Option<RegistrationToken>,
}

impl IpcClient {
    pub fn new(stream: UnixStream, id: u64, rate_limit: u32) -> Self {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!(client_id = id, "cannot make client socket non-blocking: {}", e);
        }
        let peer = match PeerCred::of(&stream) {
            Ok(peer) => {
                debug!(client_id = id, peer_uid = peer.uid, peer_pid = ?peer.pid, "peer credentials");
                Some(peer)
            }
            Err(e) => {
                warn!(client_id = id, "failed to read peer credentials: {}", e);
                None
            }
        };

        Self {
            id,
            stream,
            decoder: FrameDecoder::new(),
            outbox: Vec::new(),
            authenticated: false,
            client_name: None,
            peer,
            limiter: TokenBucket::new(rate_limit),
            source: None,
        }
    }

    /// Take one chunk from the socket into the decoder.
    /// `Ok(false)` once the peer has closed its end.
    fn fill(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.stream.read(&mut chunk) {
            Ok(0) => Ok(false),
            Ok(n) => {
                self.decoder.feed(&chunk[..n]);
                Ok(true)
            }
            Err(e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) =>
            {
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Queue a response. Responses are never dropped.
    pub fn send(&mut self, payload: &str) {
        self.outbox.extend_from_slice(&codec::encode(payload));
    }

    /// Queue an event unless the client is too far behind.
    /// Returns whether it was queued.
    pub fn send_event(&mut self, payload: &str) -> bool {
        if self.outbox.len() > MAX_OUTBOX {
            warn!(client_id = self.id, queued = self.outbox.len(), "client lagging, event dropped");
            return false;
        }
        self.send(payload);
        true
    }

    /// Write as much queued output as the socket accepts.
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.outbox.is_empty() {
            match self.stream.write(&self.outbox) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

// ── Server ─────────────────────────────────────────────────

/// Listener socket and connected clients.
pub struct IpcServer {
    pub socket_path: PathBuf,
    pub clients: HashMap<u64, IpcClient>,
    next_client_id: u64,
    pub ipc_trace: bool,
    /// Rate applied to newly connected clients.
    pub rate_limit: u32,
    loop_handle: Option<LoopHandle<'static, SignBridgeState>>,
}

impl IpcServer {
    /// Create the server state; nothing is bound until `bind`.
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            clients: HashMap::new(),
            next_client_id: 1,
            ipc_trace: false,
            rate_limit: DEFAULT_RATE_LIMIT,
            loop_handle: None,
        }
    }

    /// `$XDG_RUNTIME_DIR/signbridge-ipc.sock`, or a per-user directory
    /// under `/tmp` when no runtime dir is set.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/tmp/signbridge-{}", unsafe { libc::getuid() }));
        PathBuf::from(runtime_dir).join("signbridge-ipc.sock")
    }

    /// Track a connection without registering it with an event loop.
    pub fn add_client(&mut self, stream: UnixStream) -> u64 {
        let client_id = self.next_client_id;
        self.next_client_id += 1;
        self.clients
            .insert(client_id, IpcClient::new(stream, client_id, self.rate_limit));
        info!(client_id, "IPC client connected");
        client_id
    }

    /// Forget a client. Its event source, if any, is left to the caller.
    fn disconnect(&mut self, client_id: u64, reason: &str) -> Option<IpcClient> {
        let client = self.clients.remove(&client_id)?;
        info!(client_id, reason, "IPC client disconnected");
        Some(client)
    }

    /// Bind the socket at `state.ipc_server.socket_path` and start
    /// accepting connections on `loop_handle`.
    pub fn bind(
        state: &mut SignBridgeState,
        loop_handle: &LoopHandle<'static, SignBridgeState>,
    ) -> anyhow::Result<()> {
        let socket_path = state.ipc_server.socket_path.clone();
        prepare_socket_path(&socket_path)?;

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("binding {}", socket_path.display()))?;
        listener.set_nonblocking(true)?;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))?;

        let source = Generic::new(listener, Interest::READ, Mode::Level);
        loop_handle
            .insert_source(source, |_, listener, state| {
                Self::accept_pending(state, listener);
                Ok(PostAction::Continue)
            })
            .map_err(|e| anyhow!("registering IPC listener: {}", e.error))?;

        state.ipc_server.loop_handle = Some(loop_handle.clone());
        info!(socket_path = %socket_path.display(), "IPC server listening");
        Ok(())
    }

    fn accept_pending(state: &mut SignBridgeState, listener: &UnixListener) {
        loop {
            match listener.accept() {
                Ok((stream, _addr)) => Self::register(state, stream),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("accept error: {}", e);
                    break;
                }
            }
        }
    }

    /// Track a new connection and watch it for readability.
    fn register(state: &mut SignBridgeState, stream: UnixStream) {
        let readiness = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                error!("cannot watch new client: {}", e);
                return;
            }
        };
        let client_id = state.ipc_server.add_client(stream);
        let Some(handle) = state.ipc_server.loop_handle.clone() else {
            return;
        };

        let source = Generic::new(readiness, Interest::READ, Mode::Level);
        let inserted = handle.insert_source(source, move |_, _, state| {
            Ok(if Self::service_client(state, client_id) {
                PostAction::Continue
            } else {
                PostAction::Remove
            })
        });
        match inserted {
            Ok(token) => {
                if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
                    client.source = Some(token);
                }
            }
            Err(e) => {
                error!(client_id, "cannot watch client: {}", e.error);
                state.ipc_server.disconnect(client_id, "registration failed");
            }
        }
    }

    /// Read, decode and answer whatever a client has sent.
    ///
    /// Returns `false` once the client is gone, in which case it has
    /// already been removed.
    pub fn service_client(state: &mut SignBridgeState, client_id: u64) -> bool {
        let Some(client) = state.ipc_server.clients.get_mut(&client_id) else {
            return false;
        };
        match client.fill() {
            Ok(true) => {}
            Ok(false) => {
                state.ipc_server.disconnect(client_id, "peer closed");
                return false;
            }
            Err(e) => {
                state.ipc_server.disconnect(client_id, &e.to_string());
                return false;
            }
        }

        if !Self::drain_frames(state, client_id) {
            return false;
        }

        let Some(client) = state.ipc_server.clients.get_mut(&client_id) else {
            return false;
        };
        if let Err(e) = client.flush() {
            state.ipc_server.disconnect(client_id, &e.to_string());
            return false;
        }
        true
    }

    /// Dispatch every complete frame. A frame that is not UTF-8 gets an
    /// error response; an oversize header ends the connection.
    fn drain_frames(state: &mut SignBridgeState, client_id: u64) -> bool {
        loop {
            let next = match state.ipc_server.clients.get_mut(&client_id) {
                Some(client) => client.decoder.next_frame(),
                None => return false,
            };
            match next {
                Ok(Some(message)) => Self::handle_incoming(state, client_id, &message),
                Ok(None) => return true,
                Err(err) => {
                    warn!(client_id, "rejected frame: {}", err);
                    let Some(client) = state.ipc_server.clients.get_mut(&client_id) else {
                        return false;
                    };
                    client.send(&dispatch::error_response(0, &err.to_string()));
                    if err.is_fatal() {
                        // Best effort: the peer learns why before the close.
                        let _ = client.flush();
                        state.ipc_server.disconnect(client_id, "oversize frame");
                        return false;
                    }
                }
            }
        }
    }

    /// Rate-limit, trace and dispatch one message, queueing the response.
    pub fn handle_incoming(state: &mut SignBridgeState, client_id: u64, message: &str) {
        let allowed = state
            .ipc_server
            .clients
            .get_mut(&client_id)
            .map(|c| c.limiter.try_take())
            .unwrap_or(false);
        if !allowed {
            warn!(client_id, "rate limit exceeded, dropping message");
            if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
                client.send(&dispatch::error_response(0, "rate limit exceeded"));
            }
            return;
        }

        if state.ipc_server.ipc_trace {
            info!(client_id, "<< {}", message);
        }
        let Some(response) = dispatch::handle_message(state, client_id, message) else {
            return;
        };
        if state.ipc_server.ipc_trace {
            info!(client_id, ">> {}", response);
        }
        if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
            client.send(&response);
        }
    }

    /// Queue an event for every authenticated client.
    pub fn broadcast_event(state: &mut SignBridgeState, event: &str) {
        if state.ipc_server.ipc_trace {
            info!("broadcast >> {}", event);
        }
        for client in state.ipc_server.clients.values_mut() {
            if client.authenticated {
                client.send_event(event);
            }
        }
    }

    /// Write queued output for every client and drop those whose socket
    /// failed. Must run outside event dispatch.
    pub fn flush_clients(state: &mut SignBridgeState) {
        let failed: Vec<(u64, io::Error)> = state
            .ipc_server
            .clients
            .iter_mut()
            .filter_map(|(id, client)| client.flush().err().map(|e| (*id, e)))
            .collect();

        for (client_id, e) in failed {
            let server = &mut state.ipc_server;
            let Some(client) = server.disconnect(client_id, &e.to_string()) else {
                continue;
            };
            if let (Some(token), Some(handle)) = (client.source, server.loop_handle.as_ref()) {
                handle.remove(token);
            }
        }
    }
}

/// Make `path` available for binding.
///
/// Creates the parent directory (mode 0700) and removes a socket left
/// behind by a dead server. Refuses to touch anything that is not a
/// socket, or a socket another server still answers on.
fn prepare_socket_path(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
            std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
        }
    }

    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("inspecting {}", path.display())),
    };
    if !meta.file_type().is_socket() {
        bail!("{} exists and is not a socket", path.display());
    }
    if UnixStream::connect(path).is_ok() {
        bail!("another server is already listening on {}", path.display());
    }
    std::fs::remove_file(path)
        .with_context(|| format!("removing stale socket {}", path.display()))?;
    info!(socket_path = %path.display(), "removed stale socket");
    Ok(())
}
