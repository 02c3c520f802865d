//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! Each line is dispatched on its own task so a long generation does not block
//! `ping` or `tools/list`. Replies funnel through one writer task, so lines on
//! stdout never interleave.

use std::sync::Arc;

use anyhow::Context as _;
use genmedia_mcp::GenMediaMcpServer;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::metrics;

/// Outbound reply queue depth.
const REPLY_QUEUE: usize = 64;

/// Serve the process's stdin and stdout until stdin closes.
///
/// # Errors
///
/// Returns an error if reading stdin or writing stdout fails.
pub async fn run(server: Arc<GenMediaMcpServer>) -> anyhow::Result<()> {
    serve(server, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve JSON-RPC lines from `reader`, writing replies to `writer`.
///
/// Returns after `reader` reaches EOF and every in-flight request has replied.
///
/// # Errors
///
/// Returns an error if reading or writing fails.
pub async fn serve<R, W>(server: Arc<GenMediaMcpServer>, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<String>(REPLY_QUEUE);
    let writer_task = tokio::spawn(write_replies(rx, writer));

    let mut lines = BufReader::new(reader).lines();
    let mut in_flight = JoinSet::new();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let server = Arc::clone(&server);
        let tx = tx.clone();
        metrics::inc_stdio_in_flight();
        in_flight.spawn(async move {
            if let Some(reply) = server.handle_json(&line).await {
                if tx.send(reply).await.is_err() {
                    tracing::warn!("stdout writer closed, dropping reply");
                }
            }
            metrics::dec_stdio_in_flight();
        });

        // Reap finished tasks so the set does not grow for long sessions.
        while let Some(joined) = in_flight.try_join_next() {
            log_join_error(joined);
        }
    }

    tracing::info!("stdin closed, waiting for {} in-flight request(s)", in_flight.len());
    while let Some(joined) = in_flight.join_next().await {
        log_join_error(joined);
    }
    drop(tx);

    writer_task.await.context("stdout writer panicked")?
}

async fn write_replies<W>(mut rx: mpsc::Receiver<String>, mut writer: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = rx.recv().await {
        writer
            .write_all(reply.as_bytes())
            .await
            .context("failed to write stdout")?;
        writer.write_all(b"\n").await.context("failed to write stdout")?;
        writer.flush().await.context("failed to flush stdout")?;
    }
    Ok(())
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!("request task failed: {e}");
    }
}
