//! Domain types exchanged with the engine.

pub mod five_tuple;
pub mod role;
