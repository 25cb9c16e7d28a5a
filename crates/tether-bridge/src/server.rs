//! The stdio server loop.
//!
//! Reads one JSON-RPC request per line, executes it inline, and writes the
//! response through the shared output channel. Asynchronous notifications
//! from the event loop ride the same channel, so a dedicated writer task is
//! the single point that touches stdout.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use tether_jdi::VmConnector;

use crate::rpc::{self, Params, RpcError};
use crate::session::{Notifier, Session, StepAction};

/// Run the bridge over stdin/stdout until EOF or a `shutdown` request.
pub async fn run_stdio(connector: Arc<dyn VmConnector>, max_tokens: u64) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    run(stdin, stdout, connector, max_tokens).await
}

pub async fn run<R, W>(
    reader: R,
    writer: W,
    connector: Arc<dyn VmConnector>,
    max_tokens: u64,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(message) = out_rx.recv().await {
            let mut line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(err) => {
                    tracing::error!(%err, "unserializable output message");
                    continue;
                }
            };
            line.push('\n');
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = writer.flush().await;
        }
    });

    let session = Session::with_max_tokens(connector, Notifier::new(out_tx.clone()), max_tokens);

    let mut lines = BufReader::new(reader).lines();
    let mut shutdown = false;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request = match rpc::parse_request(&line) {
            Ok(request) => request,
            Err(err) => {
                let _ = out_tx.send(rpc::error_response(None, &err));
                continue;
            }
        };

        tracing::debug!(method = %request.method, id = ?request.id, "request");
        let params = Params(&request.params);

        if request.method == "shutdown" {
            if let Some(id) = request.id {
                let _ = out_tx.send(rpc::success_response(
                    id,
                    json!({ "status": "shutting_down" }),
                ));
            }
            shutdown = true;
            break;
        }

        let result = dispatch(&session, &request.method, &params).await;
        if let Some(id) = request.id {
            let message = match result {
                Ok(result) => rpc::success_response(id, result),
                Err(err) => rpc::error_response(Some(id), &err),
            };
            let _ = out_tx.send(message);
        } else if let Err(err) = result {
            tracing::warn!(method = %request.method, %err, "notification failed");
        }
    }

    // Tear the VM connection down so the event-loop thread exits before we
    // drop the output channel.
    let _ = session.detach();

    drop(out_tx);
    drop(session);
    let _ = writer_task.await;

    if shutdown {
        tracing::info!("shutdown requested");
    }
    Ok(())
}

async fn dispatch(
    session: &Arc<Session>,
    method: &str,
    params: &Params<'_>,
) -> Result<Value, RpcError> {
    match method {
        "ping" => Ok(json!({ "pong": true })),
        "attach" => session.attach(params),
        "detach" => session.detach(),
        "status" => Ok(session.status()),
        "set_breakpoint" => session.set_breakpoint(params),
        "remove_breakpoint" => session.remove_breakpoint(params),
        "list_breakpoints" => session.list_breakpoints(),
        "set_exception_breakpoint" => session.set_exception_breakpoint(params),
        "remove_exception_breakpoint" => session.remove_exception_breakpoint(params),
        "list_exception_breakpoints" => session.list_exception_breakpoints(),
        "logpoint_history" => session.logpoint_history(params),
        "list_threads" => session.list_threads(params),
        "step_over" => session.step(StepAction::Over, params).await,
        "step_into" => session.step(StepAction::Into, params).await,
        "step_out" => session.step(StepAction::Out, params).await,
        "resume" => session.resume(params),
        "stack_trace" => session.stack_trace(params),
        "inspect_variable" => session.inspect_variable(params),
        "evaluate" => session.evaluate(params),
        "load_mapping" => session.load_mapping(params),
        "clear_mapping" => session.clear_mapping(),
        other => Err(RpcError::method_not_found(other)),
    }
}
