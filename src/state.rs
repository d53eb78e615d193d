//! Service state: the central struct owned by the event loop.
//!
//! A single `SignBridgeState` owns everything and is passed as `&mut` to
//! the IPC server and every message handler.

use std::time::Instant;

use tracing::info;

use crate::history::ConversationLog;
use crate::ipc::IpcServer;
use crate::service::ServiceConfig;
use crate::sign::{GestureClassifier, PhraseCatalog};

/// Request counters reported by the health handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub classifications: u64,
    pub unknown_classifications: u64,
    pub lookups: u64,
    pub unsupported_lookups: u64,
}

/// Central service state.
pub struct SignBridgeState {
    // IPC
    pub ipc_server: IpcServer,

    // Recognition
    pub classifier: GestureClassifier,
    pub catalog: PhraseCatalog,

    // Conversation history
    pub history: ConversationLog,
    pub stats: ServiceStats,

    pub started_at: Instant,

    // Shutdown flag
    pub running: bool,
}

impl SignBridgeState {
    pub fn new(config: &ServiceConfig) -> Self {
        let mut ipc_server = IpcServer::new(config.socket_path());
        ipc_server.ipc_trace = config.ipc_trace;
        ipc_server.rate_limit = config.rate_limit;

        let classifier = GestureClassifier::new();
        let catalog = PhraseCatalog::new();
        info!(
            gestures = classifier.rule_count(),
            phrases = catalog.len(),
            history_limit = config.history_limit,
            "SignBridgeState initialized"
        );

        Self {
            ipc_server,
            classifier,
            catalog,
            history: ConversationLog::new(config.history_limit),
            stats: ServiceStats::default(),
            started_at: Instant::now(),
            running: true,
        }
    }

    /// Seconds since the service started.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
