#![forbid(unsafe_code)]

//! Drives the natty NAT traversal engine as a subprocess.
//!
//! A [`Session`] spawns the engine in offerer or answerer mode, forwards the
//! signaling messages it prints to a caller-supplied [`SignalingSink`], feeds
//! it messages from the remote peer through an [`InboundHandle`], and resolves
//! with the negotiated [`FiveTuple`].

pub mod config;
pub mod engine;
pub mod errors;
pub mod models;
pub mod session;

pub use config::EngineConfig;
pub use engine::spawner::EngineBinary;
pub use engine::{DebugSink, SignalingSink};
pub use errors::{AppError, Result};
pub use models::five_tuple::{FiveTuple, Protocol};
pub use models::role::Role;
pub use session::{InboundHandle, Session};
