//! Serves one built-in capability catalog over stdio or HTTP.
//!
//! ```text
//! capability-provider --catalog math
//! capability-provider --catalog weather --transport http --bind 127.0.0.1:8000
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_provider::{Catalog, HttpServerOptions, serve_http, serve_stdio};
use bridge_telemetry::TelemetryConfig;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// Streamable HTTP on `--bind`.
    Http,
}

#[derive(Debug, Parser)]
#[command(name = "capability-provider", version, about = "Serve a capability catalog")]
struct Args {
    /// Catalog to serve: math, bmi or weather.
    #[arg(long, default_value = "math")]
    catalog: String,

    /// Transport to serve on.
    #[arg(long, value_enum, default_value = "stdio")]
    transport: TransportArg,

    /// Listen address for the HTTP transport.
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Endpoint path for the HTTP transport.
    #[arg(long, default_value = "/mcp")]
    path: String,

    /// Answer HTTP requests with event streams when the client accepts them.
    #[arg(long)]
    event_stream: bool,

    /// Split capability listings into pages of this size.
    #[arg(long)]
    page_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    bridge_telemetry::init(&TelemetryConfig::default().with_target(false))?;

    let catalog: Catalog = args.catalog.parse()?;
    let mut provider = catalog
        .provider()
        .with_context(|| format!("failed to build the {catalog} catalog"))?;
    if let Some(size) = args.page_size {
        provider = provider.with_page_size(size);
    }
    let provider = Arc::new(provider);

    match args.transport {
        TransportArg::Stdio => serve_stdio(provider).await?,
        TransportArg::Http => {
            let options = HttpServerOptions::default()
                .with_path(args.path)
                .with_event_stream(args.event_stream);
            serve_http(provider, args.bind, options).await?;
        }
    }
    Ok(())
}
