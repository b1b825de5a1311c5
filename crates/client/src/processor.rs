//! Session loop for a live job-channel connection.
//!
//! Splits the socket, forwards queued [`ClientCommand`]s, sends a
//! heartbeat `ping`, and parses inbound text frames into
//! [`ServerMessage`]s. Job updates are fanned out on the broadcast
//! channel; everything else is logged.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tellmemo_core::job::JobUpdate;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::JobSocket;
use crate::messages::{parse_server_message, ClientCommand, ServerMessage};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The channel is shutting down.
    Cancelled,
    /// The server closed the socket or the stream ended.
    Closed,
    /// A send or receive failed.
    Error(String),
}

/// Heartbeat timer, or `None` when `period` is zero.
fn heartbeat_ticker(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

/// Next heartbeat tick. Never resolves when the heartbeat is disabled.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Drive one WebSocket session until it drops or `cancel` fires.
/// A zero `heartbeat` sends no pings.
pub async fn run_session(
    socket: JobSocket,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientCommand>,
    update_tx: &broadcast::Sender<JobUpdate>,
    heartbeat: Duration,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();
    let mut ticker = heartbeat_ticker(heartbeat);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            command = outbound_rx.recv() => {
                let Some(command) = command else {
                    return SessionEnd::Closed;
                };
                tracing::debug!(?command, "Sending job channel command");
                if let Err(e) = sink.send(Message::Text(command.to_json())).await {
                    tracing::error!(error = %e, "Failed to send job channel command");
                    return SessionEnd::Error(e.to_string());
                }
            }
            _ = next_tick(&mut ticker) => {
                if let Err(e) = sink.send(Message::Text(ClientCommand::Ping.to_json())).await {
                    tracing::error!(error = %e, "Failed to send heartbeat");
                    return SessionEnd::Error(e.to_string());
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_message(&text, update_tx);
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Job channel closed by server");
                        return SessionEnd::Closed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        return SessionEnd::Error(e.to_string());
                    }
                    None => {
                        tracing::info!("Job channel stream exhausted");
                        return SessionEnd::Closed;
                    }
                }
            }
        }
    }
}

/// Parse a single text frame and dispatch it.
///
/// Returns `true` when the frame carried a job update.
pub fn handle_text_message(text: &str, update_tx: &broadcast::Sender<JobUpdate>) -> bool {
    match parse_server_message(text) {
        Ok(ServerMessage::JobUpdate(update)) => {
            tracing::debug!(
                job_id = %update.job_id,
                status = %update.status,
                progress = update.progress,
                "Job update",
            );
            // No receivers is fine: nobody is watching right now.
            let _ = update_tx.send(update);
            true
        }
        Ok(ServerMessage::Subscribed(job)) => {
            tracing::debug!(job_id = %job.job_id, "Subscribed to job");
            false
        }
        Ok(ServerMessage::Unsubscribed(job)) => {
            tracing::debug!(job_id = %job.job_id, "Unsubscribed from job");
            false
        }
        Ok(ServerMessage::Pong) => {
            tracing::trace!("Heartbeat acknowledged");
            false
        }
        Ok(ServerMessage::Error(data)) => {
            tracing::warn!(
                job_id = ?data.job_id,
                message = %data.message,
                "Job channel error from server",
            );
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse job channel message");
            false
        }
    }
}
