use anyhow::Context;
use resilience::{api, init_tracing};
use std::env;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let addr: SocketAddr = env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5000".to_string())
        .parse()
        .context("Usage: values-api [host:port]")?;

    api::serve(addr).await?;
    Ok(())
}
