//! Service runtime: event loop, signal handling and periodic status.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use calloop::EventLoop;
use tracing::info;

use crate::history::DEFAULT_CAPACITY;
use crate::ipc::{self, server::DEFAULT_RATE_LIMIT};
use crate::state::SignBridgeState;

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// How often the loop logs a status line.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime configuration for the IPC service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Socket path override (default: `IpcServer::default_socket_path`).
    pub socket_path: Option<PathBuf>,
    /// Log every IPC message.
    pub ipc_trace: bool,
    /// Poll interval in milliseconds (higher = less CPU).
    pub poll_interval_ms: u64,
    /// Conversation entries retained before eviction.
    pub history_limit: usize,
    /// Messages per second allowed per client, 0 for no limit.
    pub rate_limit: u32,
    /// Exit after N seconds.
    pub exit_after: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            ipc_trace: false,
            poll_interval_ms: 100,
            history_limit: DEFAULT_CAPACITY,
            rate_limit: DEFAULT_RATE_LIMIT,
            exit_after: None,
        }
    }
}

impl ServiceConfig {
    /// Resolved socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(ipc::IpcServer::default_socket_path)
    }
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Run the service until a signal arrives or the exit timer fires.
pub fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let mut event_loop = EventLoop::<SignBridgeState>::try_new()?;
    let mut state = SignBridgeState::new(&config);

    ipc::IpcServer::bind(&mut state, &event_loop.handle())?;

    install_signal_handlers();

    let start_time = Instant::now();
    let exit_duration = config.exit_after.map(Duration::from_secs);
    let mut last_status_log = Instant::now();

    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    info!(
        poll_interval_ms = config.poll_interval_ms,
        "signbridge service initialized, entering event loop"
    );

    while state.running {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            state.running = false;
            break;
        }

        if let Some(dur) = exit_duration {
            if start_time.elapsed() >= dur {
                info!("Exit timer fired after {}s", dur.as_secs());
                state.running = false;
                break;
            }
        }

        if last_status_log.elapsed() >= STATUS_INTERVAL {
            info!(
                clients = state.ipc_server.clients.len(),
                history = state.history.len(),
                classifications = state.stats.classifications,
                lookups = state.stats.lookups,
                "status"
            );
            last_status_log = Instant::now();
        }

        event_loop.dispatch(Some(poll_interval), &mut state)?;

        // Responses go out during dispatch; broadcasts and leftovers here.
        ipc::IpcServer::flush_clients(&mut state);
    }

    // Clean up IPC socket
    let _ = std::fs::remove_file(&state.ipc_server.socket_path);

    info!(
        clients = state.ipc_server.clients.len(),
        history = state.history.len(),
        uptime_secs = state.uptime_secs(),
        "signbridge service shutting down"
    );
    Ok(())
}
