//! Outbound line router.
//!
//! Reads newline-delimited records from engine stdout through a
//! [`FramedRead`] backed by [`RecordCodec`]. Each record is either the final
//! result (it contains
//! [`RESULT_MARKER`](crate::models::five_tuple::RESULT_MARKER)) or an opaque
//! signaling message for the remote peer.
//!
//! | Record                         | Action                                   |
//! |--------------------------------|------------------------------------------|
//! | contains `5-tuple`, valid JSON | send [`FiveTuple`] on the result slot, stop |
//! | contains `5-tuple`, malformed  | post `Err(AppError::Decode)`, stop       |
//! | anything else                  | forward verbatim to the [`SignalingSink`] |
//! | clean EOF                      | post `Ok(())`, stop                      |
//! | read failure                   | post `Err(AppError::Io)`, stop           |

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::codec::RecordCodec;
use crate::engine::{post_outcome, Activity, ActivityOutcome, SignalingSink};
use crate::models::five_tuple::FiveTuple;
use crate::Result;

/// A classified stdout record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// The negotiated path; ends the session successfully.
    Result(FiveTuple),
    /// Signaling message for the remote peer.
    Signal(Bytes),
}

/// Classify one stdout record.
///
/// # Errors
///
/// Returns `AppError::Decode` when the record carries the result marker but
/// is not a valid five-tuple.
pub fn classify_record(record: Bytes) -> Result<Record> {
    if FiveTuple::is_result_record(&record) {
        FiveTuple::from_record(&record).map(Record::Result)
    } else {
        Ok(Record::Signal(record))
    }
}

/// Router task: reads `stdout` until the result arrives or the stream ends.
///
/// The result is delivered at most once; the router returns right after
/// sending it, dropping `result_tx`. Exits silently on `shutdown`.
pub async fn run_router<R>(
    session_id: String,
    stdout: R,
    max_line_bytes: usize,
    sink: Arc<dyn SignalingSink>,
    result_tx: oneshot::Sender<FiveTuple>,
    notices: mpsc::Sender<ActivityOutcome>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, RecordCodec::with_max_length(max_line_bytes));
    let mut forwarded: u64 = 0;

    let end = loop {
        let item = tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                debug!(session_id, forwarded, "router: shutdown received, stopping");
                return;
            }

            item = framed.next() => item,
        };

        match item {
            None => {
                debug!(session_id, forwarded, "router: engine stdout closed");
                break Ok(());
            }

            Some(Err(err)) => {
                warn!(session_id, error = %err, "router: stdout read failed, stopping");
                break Err(err);
            }

            Some(Ok(record)) => match classify_record(record) {
                Ok(Record::Signal(msg)) => {
                    debug!(session_id, bytes = msg.len(), "router: forwarding signaling message");
                    sink.send(msg);
                    forwarded += 1;
                }
                Ok(Record::Result(tuple)) => {
                    info!(session_id, %tuple, "router: result received");
                    if result_tx.send(tuple).is_err() {
                        debug!(session_id, "router: controller gone before result delivery");
                    }
                    return;
                }
                Err(err) => {
                    warn!(session_id, error = %err, "router: malformed result record, stopping");
                    break Err(err);
                }
            },
        }
    };

    post_outcome(&notices, &session_id, Activity::Router, end).await;
}
