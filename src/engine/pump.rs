//! Inbound message pump.
//!
//! Receives [`InboundRequest`]s from a tokio [`mpsc`] channel and writes each
//! payload plus a `\n` delimiter to engine stdin through a [`FramedWrite`]
//! backed by [`RecordCodec`]. Requests are handled one at a time, so writes
//! never interleave and complete in queue order. Each request carries its own
//! responder; write failures go back to that submitter only and never end the
//! session.

use bytes::Bytes;
use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::codec::RecordCodec;
use crate::{AppError, Result};

/// One inbound signaling message awaiting its write.
#[derive(Debug)]
pub struct InboundRequest {
    /// Message bytes, without a trailing newline.
    pub payload: Bytes,
    /// Receives the write outcome.
    pub reply: oneshot::Sender<Result<()>>,
}

/// Pump task: writes inbound messages to `stdin` until shutdown.
///
/// Engine stdin stays open until `shutdown` fires, even after every request
/// sender is dropped; it is closed when the task returns. A write interrupted
/// by shutdown is answered with `AppError::SessionClosed`.
pub async fn run_pump<W>(
    session_id: String,
    stdin: W,
    mut requests: mpsc::Receiver<InboundRequest>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut framed = FramedWrite::new(stdin, RecordCodec::new());
    let mut written: u64 = 0;

    loop {
        let request = tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                debug!(session_id, written, "pump: shutdown received, stopping");
                break;
            }

            request = requests.recv() => match request {
                Some(request) => request,
                None => {
                    debug!(session_id, written, "pump: all inbound handles dropped");
                    shutdown.cancelled().await;
                    break;
                }
            },
        };

        let InboundRequest { payload, reply } = request;
        let bytes = payload.len();

        let result = tokio::select! {
            biased;

            () = shutdown.cancelled() => Err(AppError::SessionClosed(
                "session ended before the message was written".into(),
            )),

            sent = framed.send(payload) => sent.map_err(|err| {
                warn!(session_id, error = %err, "pump: write to engine stdin failed");
                AppError::Write(format!("write to engine stdin failed: {err}"))
            }),
        };

        if result.is_ok() {
            written += 1;
            debug!(session_id, bytes, "pump: inbound message written");
        }

        if reply.send(result).is_err() {
            debug!(session_id, "pump: submitter gone before write result delivery");
        }
    }
}
