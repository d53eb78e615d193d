//! SignBridge - hand sign recognition and text-to-sign lookup service.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use signbridge::history::DEFAULT_CAPACITY;
use signbridge::ipc::server::DEFAULT_RATE_LIMIT;
use signbridge::service::{self, ServiceConfig};
use signbridge::sign::landmarks::parse_landmarks_str;
use signbridge::sign::{self, GestureClassifier, PhraseCatalog};

#[derive(Parser, Debug)]
#[command(name = "signbridge", about = "Sign language recognition and text-to-sign service")]
struct Cli {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/signbridge-ipc.sock)
    #[arg(long)]
    ipc_socket: Option<String>,

    /// Log all IPC messages to stderr
    #[arg(long)]
    ipc_trace: bool,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Event loop poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,

    /// Conversation entries kept in memory
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    history_limit: usize,

    /// Messages per second allowed per IPC client
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT)]
    rate_limit: u32,

    /// Classify the landmark list in PATH and exit
    #[arg(long, value_name = "PATH")]
    classify_file: Option<PathBuf>,

    /// Print the animation for TEXT (key, supported, match kind) and exit
    #[arg(long, value_name = "TEXT")]
    lookup: Option<String>,

    /// List supported signs and phrases and exit
    #[arg(long)]
    list_signs: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("signbridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signbridge=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = cli.classify_file {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading pose file {}", path.display()))?;
        let pose = parse_landmarks_str(&raw)
            .with_context(|| format!("parsing pose file {}", path.display()))?;
        let result = GestureClassifier::new().classify(&pose);
        println!("{} {:.2}", result.label(), result.confidence);
        return Ok(());
    }

    if let Some(text) = cli.lookup {
        println!("{}", lookup_line(&text));
        return Ok(());
    }

    if cli.list_signs {
        for gesture in sign::supported_gestures() {
            println!("sign\t{gesture}");
        }
        for phrase in PhraseCatalog::new().phrases() {
            println!("phrase\t{phrase}");
        }
        return Ok(());
    }

    info!("signbridge v{} starting", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig {
        socket_path: cli.ipc_socket.map(PathBuf::from),
        ipc_trace: cli.ipc_trace,
        poll_interval_ms: cli.poll_interval_ms,
        history_limit: cli.history_limit,
        rate_limit: cli.rate_limit,
        exit_after: cli.exit_after,
    };
    service::run(config)
}

/// One tab-separated line: animation key, support flag, match kind.
fn lookup_line(text: &str) -> String {
    let found = sign::lookup(text);
    format!(
        "{}\t{}\t{}",
        found.animation_key,
        if found.supported() { "supported" } else { "unsupported" },
        found.kind.as_str()
    )
}
