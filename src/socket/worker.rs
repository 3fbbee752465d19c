use std::sync::{Arc, Weak};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::core::{Leg, Writer};
use super::session::{Flow, SessionInner};
use super::source::EventQueue;
use crate::parsing::Outgoing;

/// Writes one command on `writer` and flushes it.
pub(crate) async fn send(writer: &Writer, leg: Leg, command: &Outgoing) -> std::io::Result<()> {
    debug!(%leg, "tx: {command}");

    let mut lock = writer.lock().await;
    lock.write_all(command.to_line().as_bytes()).await?;
    lock.flush().await
}

/// Read loop for one leg of a session.
pub(crate) struct LegWorker {
    pub leg: Leg,
    pub session: Weak<SessionInner>,
    pub writer: Writer,
    /// Queue captured at connect time; a later reset closes it under us
    pub queue: Arc<EventQueue>,
    pub cancel: CancellationToken,
}

impl LegWorker {
    pub async fn run(self, reader: OwnedReadHalf) {
        info!(leg = %self.leg, "running chat worker");

        let mut lines = BufReader::new(reader).lines();

        loop {
            let line = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!(leg = %self.leg, "worker cancelled");
                    break;
                }

                line = lines.next_line() => line,
            };

            let Some(session) = self.session.upgrade() else {
                debug!(leg = %self.leg, "session dropped");
                break;
            };

            let reason = match line {
                Ok(Some(line)) => {
                    if !session.is_connected() {
                        break;
                    }

                    trace!(leg = %self.leg, "rx: {line}");
                    match session
                        .handle_line(self.leg, &line, &self.writer, &self.queue)
                        .await
                    {
                        Flow::Continue => continue,
                        Flow::Stop(reason) => reason,
                    }
                }

                Ok(None) => format!("Connection closed by server on {} socket", self.leg),

                Err(err) => {
                    error!(leg = %self.leg, "socket read failed: {err}");
                    format!("Read failed on {} socket: {err}", self.leg)
                }
            };

            // a teardown in progress has already cleared `connected`
            if session.is_connected() && !self.cancel.is_cancelled() {
                session.fail(self.leg, reason).await;
            }
            break;
        }

        info!(leg = %self.leg, "stopping chat worker");
    }
}
