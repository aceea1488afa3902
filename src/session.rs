//! Session controller.
//!
//! A [`Session`] is one offer-or-answer run of the engine. Starting it spawns
//! the engine, launches the router, relay, pump and exit-watcher tasks, and
//! then waits for whichever comes first: the [`FiveTuple`] on the result slot
//! or a fatal [`ActivityOutcome`] on the error queue. Benign outcomes (stream
//! EOF, clean exit) are logged and skipped.
//!
//! An abnormal engine exit is held until the router has read engine stdout to
//! its end, so records written before the exit are still forwarded and a
//! result printed just before it still wins. The wait is bounded by the
//! configured shutdown grace period.
//!
//! Every return path cancels the session's shutdown token and waits for all
//! tasks, so the engine's stdio is closed and the child reaped before
//! [`Session::run`] returns.
//!
//! # Indefinite wait
//!
//! If the engine never produces a result and never fails (for example it
//! exits cleanly without a result), [`Session::offer`] and
//! [`Session::answer`] never return. Callers that need a bound pass their own
//! [`CancellationToken`] to [`Session::run`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, MIN_ERROR_QUEUE_CAPACITY};
use crate::engine::pump::{run_pump, InboundRequest};
use crate::engine::relay::run_relay;
use crate::engine::router::run_router;
use crate::engine::spawner::{spawn_engine, watch_exit, EngineProcess};
use crate::engine::{Activity, ActivityOutcome, DebugSink, SignalingSink};
use crate::models::five_tuple::FiveTuple;
use crate::models::role::Role;
use crate::{AppError, Result};

/// Handle for passing messages from the remote peer to the engine.
///
/// Clone freely; every clone feeds the same session.
#[derive(Debug, Clone)]
pub struct InboundHandle {
    session_id: String,
    requests: mpsc::Sender<InboundRequest>,
}

impl InboundHandle {
    /// Write one signaling message to the engine's stdin.
    ///
    /// Resolves once the message and its trailing newline are written.
    /// Messages submitted before the session starts are held until the
    /// engine is running. Concurrent submissions are written one at a time.
    ///
    /// # Errors
    ///
    /// - `AppError::Write` — the write to engine stdin failed.
    /// - `AppError::SessionClosed` — the session was never started or has
    ///   already ended.
    pub async fn submit(&self, payload: impl Into<Bytes>) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        let request = InboundRequest {
            payload: payload.into(),
            reply,
        };

        self.requests.send(request).await.map_err(|_| {
            AppError::SessionClosed(format!(
                "session {} is not accepting messages",
                self.session_id
            ))
        })?;

        outcome.await.map_err(|_| {
            AppError::SessionClosed(format!(
                "session {} ended before the message was written",
                self.session_id
            ))
        })?
    }
}

/// One NAT traversal run of the engine.
pub struct Session {
    id: String,
    config: EngineConfig,
    sink: Arc<dyn SignalingSink>,
    debug: Option<DebugSink>,
    inbound_tx: mpsc::Sender<InboundRequest>,
    inbound_rx: mpsc::Receiver<InboundRequest>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("debug", &self.debug.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session.
    ///
    /// `sink` receives every signaling message the engine emits for the
    /// remote peer. When `debug` is set, the engine runs with `-debug` and
    /// its stderr is copied there; otherwise stderr is discarded.
    pub fn new(config: EngineConfig, sink: impl SignalingSink, debug: Option<DebugSink>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_queue_capacity.max(1));
        Self {
            id: Uuid::new_v4().to_string(),
            config,
            sink: Arc::new(sink),
            debug,
            inbound_tx,
            inbound_rx,
        }
    }

    /// Identifier attached to this session's log events.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handle for submitting messages received from the remote peer.
    #[must_use]
    pub fn inbound(&self) -> InboundHandle {
        InboundHandle {
            session_id: self.id.clone(),
            requests: self.inbound_tx.clone(),
        }
    }

    /// Run the engine as offerer until traversal succeeds or fails.
    ///
    /// Never returns if the engine neither succeeds nor fails; see the
    /// module documentation.
    ///
    /// # Errors
    ///
    /// See [`Session::run`].
    pub async fn offer(self) -> Result<FiveTuple> {
        self.run(Role::Offerer, CancellationToken::new()).await
    }

    /// Run the engine as answerer until traversal succeeds or fails.
    ///
    /// Never returns if the engine neither succeeds nor fails; see the
    /// module documentation.
    ///
    /// # Errors
    ///
    /// See [`Session::run`].
    pub async fn answer(self) -> Result<FiveTuple> {
        self.run(Role::Answerer, CancellationToken::new()).await
    }

    /// Run the engine in `role` until a result, a fatal error, or `cancel`.
    ///
    /// Dropping the returned future also shuts the session down: the engine
    /// is given the configured grace period and then killed.
    ///
    /// # Errors
    ///
    /// - `AppError::Setup` — the engine could not be prepared or spawned;
    ///   no task was started.
    /// - `AppError::Decode` — the engine emitted a malformed result record.
    /// - `AppError::Io` — reading engine stdout or stderr failed.
    /// - `AppError::Exit` — the engine exited abnormally before a result.
    /// - `AppError::Cancelled` — `cancel` fired first.
    pub async fn run(self, role: Role, cancel: CancellationToken) -> Result<FiveTuple> {
        let Self {
            id,
            config,
            sink,
            debug,
            inbound_tx,
            inbound_rx,
        } = self;
        drop(inbound_tx);

        let EngineProcess {
            child,
            stdin,
            stdout,
            stderr,
            binary,
        } = spawn_engine(&config, role, debug.is_some()).inspect_err(|err| {
            warn!(session_id = %id, %role, %err, "engine setup failed");
        })?;

        info!(session_id = %id, %role, "session started");

        let shutdown = CancellationToken::new();
        let _abandon_guard = shutdown.clone().drop_guard();
        let (notice_tx, mut notice_rx) = mpsc::channel::<ActivityOutcome>(
            config.error_queue_capacity.max(MIN_ERROR_QUEUE_CAPACITY),
        );
        let (result_tx, mut result_rx) = oneshot::channel::<FiveTuple>();

        let tracker = TaskTracker::new();
        tracker.spawn(run_router(
            id.clone(),
            stdout,
            config.max_line_bytes,
            sink,
            result_tx,
            notice_tx.clone(),
            shutdown.clone(),
        ));
        tracker.spawn(run_relay(
            id.clone(),
            stderr,
            debug,
            notice_tx.clone(),
            shutdown.clone(),
        ));
        tracker.spawn(watch_exit(
            id.clone(),
            child,
            notice_tx,
            shutdown.clone(),
            config.shutdown_grace,
        ));
        tracker.spawn(run_pump(id.clone(), stdin, inbound_rx, shutdown.clone()));
        tracker.close();

        let mut result_open = true;
        let mut notices_open = true;
        // Abnormal exit held back while the router drains engine stdout.
        let mut held_exit: Option<AppError> = None;
        let drain = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(drain);

        let outcome = loop {
            tokio::select! {
                biased;

                result = &mut result_rx, if result_open => match result {
                    Ok(tuple) => break Ok(tuple),
                    Err(_) => {
                        debug!(session_id = %id, "result slot closed without a result");
                        if let Some(err) = held_exit.take() {
                            break Err(err);
                        }
                        result_open = false;
                    }
                },

                notice = notice_rx.recv(), if notices_open => match notice {
                    Some(ActivityOutcome { activity: Activity::ProcessWait, result: Err(err) })
                        if result_open && held_exit.is_none() =>
                    {
                        debug!(session_id = %id, %err, "engine exited; draining stdout");
                        drain
                            .as_mut()
                            .reset(Instant::now() + config.shutdown_grace);
                        held_exit = Some(err);
                    }
                    Some(ActivityOutcome { activity, result: Ok(()) }) => {
                        debug!(session_id = %id, %activity, "activity finished cleanly");
                        if activity == Activity::Router {
                            if let Some(err) = held_exit.take() {
                                break Err(err);
                            }
                        }
                    }
                    Some(ActivityOutcome { activity, result: Err(err) }) => {
                        warn!(session_id = %id, %activity, %err, "activity failed");
                        break Err(held_exit.take().unwrap_or(err));
                    }
                    None => {
                        debug!(session_id = %id, "all activities have reported");
                        if let Some(err) = held_exit.take() {
                            break Err(err);
                        }
                        notices_open = false;
                    }
                },

                () = &mut drain, if held_exit.is_some() => {
                    warn!(session_id = %id, "engine stdout still open after exit; giving up on it");
                    if let Some(err) = held_exit.take() {
                        break Err(err);
                    }
                }

                () = cancel.cancelled() => {
                    break Err(AppError::Cancelled("session cancelled by caller".into()));
                }
            }

            if !result_open && !notices_open {
                warn!(
                    session_id = %id,
                    "engine finished without a result; waiting for cancellation"
                );
            }
        };

        shutdown.cancel();
        drop(notice_rx);
        tracker.wait().await;
        drop(binary);

        match &outcome {
            Ok(tuple) => info!(session_id = %id, %role, %tuple, "session succeeded"),
            Err(err) => warn!(session_id = %id, %role, %err, "session failed"),
        }

        outcome
    }
}
