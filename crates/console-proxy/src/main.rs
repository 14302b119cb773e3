use clap::Parser;
use console_proxy::config::ProxyArgs;
use console_proxy::server::shutdown_signal;
use console_proxy::ConsoleServer;
use console_proxy::ProxyConfig;
use console_proxy::ProxyError;
use error_stack::Report;
use error_stack::ResultExt;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<(), Report<ProxyError>> {
    setup_global_hooks();

    let args = ProxyArgs::parse();
    utils::logging::init();

    tracing::info!("console-proxy {}", &**version::VERSION);

    let config = ProxyConfig::from(&args);
    let server = ConsoleServer::new(&config)?;
    let shutdown_rx = shutdown_signal().change_context(ProxyError::ServerError {
        message: "failed to install signal handlers".to_string(),
    })?;

    server.run(shutdown_rx).await
}
