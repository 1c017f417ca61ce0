use std::net::SocketAddr;

use clap::Parser;
use graphite_proxy::{ProxyError, ProxyServer};
use log::info;

/// A forward HTTP/HTTPS proxy.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:3000")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), ProxyError> {
    env_logger::init();
    let args = Args::parse();

    let server = ProxyServer::bind(args.listen)?;
    info!("listening on {}", server.local_addr()?);
    server.serve().await
}
