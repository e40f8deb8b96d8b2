//! Newline-delimited JSON transport.
//!
//! Each input line is one inbound envelope:
//! `{"client": "tab-1", "correlation": "7", "message": {"type": "CHECK_MISSING", ...}}`.
//! A client id is registered the first time it is seen and its replies are
//! written to the output as outbound envelopes, one per line. An id already
//! owned by another client, such as an in-process `local:N` page, is
//! refused and its envelopes are skipped.
//!
//! Lines that are not valid envelopes are logged and skipped; there is no
//! one to reply to. At end of input the transport waits for in-flight
//! commands, writes their replies and returns.

use std::collections::HashSet;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use keepr_core::{Inbound, Outbound};

use crate::controller::Controller;
use crate::error::TransportError;

/// Serve `controller` over `input` and `output` until `input` ends.
pub async fn serve<R, W>(controller: &Controller, input: R, output: W) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_replies(rx, output));

    let mut attached = HashSet::new();
    let mut in_flight = JoinSet::new();
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let inbound: Inbound = match serde_json::from_str(&line) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed envelope");
                continue;
            }
        };

        if let Some(client) = &inbound.client
            && !attached.contains(client)
        {
            if !controller.clients().try_attach(client, tx.clone()) {
                tracing::warn!(%client, "client id owned by another connection; envelope skipped");
                continue;
            }
            attached.insert(client.clone());
            tracing::debug!(%client, "client attached");
        }

        let controller = controller.clone();
        in_flight.spawn(async move { controller.dispatch(inbound).await });
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "command task failed");
        }
    }

    for client in &attached {
        controller.clients().remove(client);
    }
    drop(tx);

    writer.await.map_err(|e| TransportError::Writer(e.to_string()))?
}

async fn write_replies<W>(mut replies: mpsc::UnboundedReceiver<Outbound>, mut output: W) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(outbound) = replies.recv().await {
        let mut line = serde_json::to_vec(&outbound)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    output.shutdown().await?;
    Ok(())
}
