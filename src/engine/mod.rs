//! Engine process stream handling.
//!
//! A session drives one engine process through four tasks, each owning one
//! resource exclusively:
//! - `router`: reads stdout records and routes them to the result slot or
//!   the caller's signaling sink.
//! - `relay`: copies stderr to the optional diagnostic sink.
//! - `pump`: writes inbound signaling messages to stdin.
//! - `spawner::watch_exit`: reaps the child and reports its exit status.
//!
//! Tasks that can end the session report through [`ActivityOutcome`]s on a
//! shared bounded queue read by the session controller.

pub mod codec;
pub mod pump;
pub mod relay;
pub mod router;
pub mod spawner;

use std::fmt;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::debug;

use crate::Result;

/// Destination for engine stderr output.
pub type DebugSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Receives signaling messages the engine wants delivered to the remote peer.
///
/// Implemented for any `Fn(Bytes)` closure, so callers usually pass one that
/// hands the message to their own transport.
pub trait SignalingSink: Send + Sync + 'static {
    /// Deliver one signaling record, without its trailing newline.
    fn send(&self, msg: Bytes);
}

impl<F> SignalingSink for F
where
    F: Fn(Bytes) + Send + Sync + 'static,
{
    fn send(&self, msg: Bytes) {
        self(msg);
    }
}

/// Session task that reports on the error-delivery queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Stdout reader.
    Router,
    /// Stderr copier.
    Relay,
    /// Child exit watcher.
    ProcessWait,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Router => "router",
            Self::Relay => "relay",
            Self::ProcessWait => "process-wait",
        })
    }
}

/// Terminal report of one session task.
///
/// `Ok(())` means the task reached a benign end (stream EOF, clean exit) and
/// does not end the session; `Err` is fatal.
#[derive(Debug)]
pub struct ActivityOutcome {
    /// Reporting task.
    pub activity: Activity,
    /// How it ended.
    pub result: Result<()>,
}

/// Post an outcome, logging if the controller has already stopped listening.
pub(crate) async fn post_outcome(
    notices: &mpsc::Sender<ActivityOutcome>,
    session_id: &str,
    activity: Activity,
    result: Result<()>,
) {
    if notices
        .send(ActivityOutcome { activity, result })
        .await
        .is_err()
    {
        debug!(
            session_id,
            %activity,
            "controller gone before outcome could be delivered"
        );
    }
}
