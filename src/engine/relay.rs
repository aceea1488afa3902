//! Debug sink relay: copies engine stderr to the diagnostic sink.

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{post_outcome, Activity, ActivityOutcome, DebugSink};
use crate::AppError;

/// Relay task: copy `stderr` into `sink` (or discard it) until EOF.
///
/// Posts `Ok(())` on a clean end of stream, which never ends the session,
/// and `Err(AppError::Io)` if reading stderr or writing the sink fails.
/// Exits silently on `shutdown`, after flushing whatever reached the sink.
pub async fn run_relay<R>(
    session_id: String,
    mut stderr: R,
    sink: Option<DebugSink>,
    notices: mpsc::Sender<ActivityOutcome>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut sink: DebugSink = sink.unwrap_or_else(|| Box::new(tokio::io::sink()));

    let copied = tokio::select! {
        biased;

        () = shutdown.cancelled() => None,

        copied = tokio::io::copy(&mut stderr, &mut sink) => Some(copied),
    };

    let Some(copied) = copied else {
        flush_sink(&session_id, &mut sink).await;
        debug!(session_id, "relay: shutdown received, stopping");
        return;
    };

    let result = match copied {
        Ok(bytes) => {
            flush_sink(&session_id, &mut sink).await;
            debug!(session_id, bytes, "relay: engine stderr closed");
            Ok(())
        }
        Err(err) => {
            warn!(session_id, %err, "relay: stderr copy failed");
            Err(AppError::Io(format!("stderr relay failed: {err}")))
        }
    };

    post_outcome(&notices, &session_id, Activity::Relay, result).await;
}

async fn flush_sink(session_id: &str, sink: &mut DebugSink) {
    if let Err(err) = sink.flush().await {
        warn!(session_id, %err, "relay: failed to flush diagnostic sink");
    }
}
