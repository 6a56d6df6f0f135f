//! Newline-delimited JSON-RPC server over a pair of byte streams.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::error::ProviderResult;
use crate::provider::CapabilityProvider;

/// Serves `provider` on the process's stdin and stdout until stdin closes.
///
/// Nothing but framed responses is ever written to stdout; diagnostics go to
/// the tracing subscriber, which must write to stderr.
///
/// # Errors
///
/// Returns [`crate::ProviderError::Io`] when stdin or stdout fails.
pub async fn serve_stdio(provider: Arc<CapabilityProvider>) -> ProviderResult<()> {
    serve_lines(provider, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serves `provider` over arbitrary streams, one JSON message per line.
///
/// # Errors
///
/// Returns [`crate::ProviderError::Io`] when reading or writing fails.
pub async fn serve_lines<R, W>(
    provider: Arc<CapabilityProvider>,
    reader: R,
    mut writer: W,
) -> ProviderResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(provider = %provider.manifest().name(), "serving over stdio");
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(response) = provider.handle_text(line).await {
            let mut frame = serde_json::to_vec(&response)?;
            frame.push(b'\n');
            writer.write_all(&frame).await?;
            writer.flush().await?;
        }
    }

    debug!("input closed, provider stopping");
    Ok(())
}
