use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use utils::version;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/kubevirt-private";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Relay a VM serial console socket over WebSocket
#[derive(Parser, Debug, Clone)]
#[command(name = "console-proxy", about, long_about = None, version = &**version::VERSION)]
pub struct ProxyArgs {
    #[arg(
        long,
        env = "CONSOLE_PROXY_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Port to listen on"
    )]
    pub port: u16,

    #[arg(
        long,
        env = "CONSOLE_PROXY_LISTEN_HOST",
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        help = "Address to listen on"
    )]
    pub listen_host: IpAddr,

    #[arg(
        long,
        env = "CONSOLE_PROXY_SOCKET_DIR",
        value_hint = clap::ValueHint::DirPath,
        default_value = DEFAULT_SOCKET_DIR,
        help = "Directory containing the per-VM directory with the virt-serial0 socket"
    )]
    pub socket_dir: PathBuf,

    #[arg(
        long,
        env = "CONSOLE_PROXY_IDLE_TIMEOUT_SECS",
        default_value_t = DEFAULT_IDLE_TIMEOUT_SECS,
        help = "Close a console session after this many seconds without client input"
    )]
    pub idle_timeout_secs: u64,
}

/// Console proxy configuration, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub socket_dir: PathBuf,
    /// Read deadline on the WebSocket side of a session.
    pub idle_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl From<&ProxyArgs> for ProxyConfig {
    fn from(args: &ProxyArgs) -> Self {
        Self {
            listen_addr: SocketAddr::new(args.listen_host, args.port),
            socket_dir: args.socket_dir.clone(),
            idle_timeout: Duration::from_secs(args.idle_timeout_secs.max(1)),
        }
    }
}
