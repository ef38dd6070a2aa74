//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! Each request runs on its own task so a long flow never blocks a quick
//! call. Responses funnel through one writer task, which keeps lines whole.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::mcp::server::McpServer;
use crate::mcp::types::{JsonRpcRequest, INVALID_REQUEST, PARSE_ERROR};
use crate::mcp::JsonRpcEnvelopes;

/// Serve on the process's stdin/stdout until EOF or SIGINT/SIGTERM.
pub async fn run_stdio(server: Arc<McpServer>) -> Result<()> {
    info!("Serving MCP over stdio");
    serve(
        server,
        tokio::io::stdin(),
        tokio::io::stdout(),
        shutdown_signal(),
    )
    .await
}

/// Serve requests read from `reader`, writing responses to `writer`.
///
/// On EOF, in-flight requests are allowed to finish. When `shutdown`
/// completes first they are aborted, which also kills any tool processes they
/// started.
pub async fn serve<R, W, S>(server: Arc<McpServer>, reader: R, writer: W, shutdown: S) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(write_responses(writer, rx));

    let mut lines = BufReader::new(reader).lines();
    let mut in_flight = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => dispatch(&server, &tx, &mut in_flight, line),
                    Ok(None) => {
                        info!("Stdin reached EOF, finishing {} in-flight requests", in_flight.len());
                        while in_flight.join_next().await.is_some() {}
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read request: {}", e);
                        in_flight.abort_all();
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested, aborting {} in-flight requests", in_flight.len());
                in_flight.abort_all();
                break;
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
    drop(tx);
    if let Err(e) = writer_task.await {
        warn!("Writer task ended abnormally: {}", e);
    }
    Ok(())
}

fn dispatch(
    server: &Arc<McpServer>,
    tx: &mpsc::UnboundedSender<String>,
    in_flight: &mut JoinSet<()>,
    line: String,
) {
    while let Some(finished) = in_flight.try_join_next() {
        if let Err(e) = finished {
            if e.is_panic() {
                error!("Request task panicked: {}", e);
            }
        }
    }

    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!("Received unparseable message: {}", e);
            let response = JsonRpcEnvelopes::error_response(
                PARSE_ERROR,
                &format!("Parse error: {}", e),
                None,
            );
            let _ = tx.send(response.to_string());
            return;
        }
    };

    let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
        Ok(request) => request,
        Err(e) => {
            warn!("Received malformed request: {}", e);
            let id = value.get("id").cloned();
            let response = JsonRpcEnvelopes::error_response(
                INVALID_REQUEST,
                &format!("Invalid request: {}", e),
                id,
            );
            let _ = tx.send(response.to_string());
            return;
        }
    };

    let server = Arc::clone(server);
    let tx = tx.clone();
    in_flight.spawn(async move {
        let notification = request.is_notification();
        let response = server.handle_request(request).await;
        if notification {
            return;
        }
        match serde_json::to_string(&response) {
            Ok(text) => {
                if tx.send(text).is_err() {
                    debug!("Response dropped, writer already closed");
                }
            }
            Err(e) => error!("Failed to serialize response: {}", e),
        }
    });
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let written = async {
            writer.write_all(message.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            error!("Failed to write response: {}", e);
            break;
        }
    }
}

/// Wait until a shutdown signal is received (SIGINT/SIGTERM)
async fn shutdown_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = wait_for_sigterm() => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
