use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use futures::StreamExt;
use poem::get;
use poem::handler;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::web::websocket::WebSocket;
use poem::web::websocket::WebSocketStream;
use poem::web::Data;
use poem::Endpoint;
use poem::EndpointExt;
use poem::IntoResponse;
use poem::Route;
use poem::Server;
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::warn;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::discovery::discover_socket_path;
use crate::error::ProxyError;
use crate::relay;

/// Path serving the console WebSocket.
pub const CONSOLE_PATH: &str = "/console";

/// WebSocket subprotocol spoken by KubeVirt console clients.
pub const SUBPROTOCOL: &str = "binary.kubevirt.io";

/// Per-server state shared by all console sessions.
struct ConsoleTarget {
    socket_path: PathBuf,
    idle_timeout: Duration,
    sessions: AtomicU64,
}

/// WebSocket server bridging clients to the VM serial console.
pub struct ConsoleServer {
    listen_addr: String,
    target: Arc<ConsoleTarget>,
}

impl ConsoleServer {
    /// Resolve the console socket and prepare the server.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::SocketDirUnreadable`] or [`ProxyError::AmbiguousSocketDir`]
    ///   if the socket directory does not hold exactly one VM directory
    pub fn new(config: &ProxyConfig) -> Result<Self, Report<ProxyError>> {
        let socket_path = discover_socket_path(&config.socket_dir)?;
        info!("Console socket resolved to {}", socket_path.display());

        Ok(Self {
            listen_addr: config.listen_addr.to_string(),
            target: Arc::new(ConsoleTarget {
                socket_path,
                idle_timeout: config.idle_timeout,
                sessions: AtomicU64::new(0),
            }),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.target.socket_path
    }

    /// The HTTP routes of the server.
    pub fn app(&self) -> impl Endpoint {
        Route::new()
            .at(CONSOLE_PATH, get(console_ws))
            .data(Arc::clone(&self.target))
            .with(Tracing)
    }

    /// Serve console sessions until `shutdown_rx` fires.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::ServerError`] if the server fails to bind or stops
    ///   unexpectedly
    pub async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) -> Result<(), Report<ProxyError>> {
        info!("Starting console proxy on {}", self.listen_addr);

        let app = self.app();
        let server = Server::new(TcpListener::bind(self.listen_addr));

        tokio::select! {
            result = server.run(app) => {
                match result {
                    Ok(()) => {
                        info!("Console proxy stopped normally");
                        Ok(())
                    }
                    Err(e) => {
                        error!("Console proxy failed: {e}");
                        Err(Report::new(ProxyError::ServerError {
                            message: format!("Server failed: {e}"),
                        }))
                    }
                }
            }
            _ = &mut shutdown_rx => {
                info!("Console proxy shutdown requested");
                Ok(())
            }
        }
    }
}

#[handler]
fn console_ws(ws: WebSocket, Data(target): Data<&Arc<ConsoleTarget>>) -> impl IntoResponse {
    let target = Arc::clone(target);
    let session = target.sessions.fetch_add(1, Ordering::Relaxed);
    ws.protocols([SUBPROTOCOL]).on_upgrade(move |socket| {
        serve_session(socket, target).instrument(info_span!("console", session))
    })
}

async fn serve_session(socket: WebSocketStream, target: Arc<ConsoleTarget>) {
    let serial = match UnixStream::connect(&target.socket_path).await {
        Ok(serial) => serial,
        Err(e) => {
            warn!(
                "Failed to connect to console socket {}: {e}",
                target.socket_path.display()
            );
            return;
        }
    };
    info!("Console session started");

    let (sink, stream) = socket.split();
    let (direction, reason) = relay::relay(sink, stream, serial, target.idle_timeout).await;

    info!(%direction, "Console session closed: {reason}");
}

/// Resolves on the first SIGTERM or SIGINT.
///
/// # Errors
///
/// Fails if the signal handlers cannot be installed.
pub fn shutdown_signal() -> std::io::Result<oneshot::Receiver<()>> {
    use tokio::signal::unix::signal;
    use tokio::signal::unix::SignalKind;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
        let _ = tx.send(());
    });

    Ok(rx)
}
