//! This module exports a minimal message-passing API. A transport layer is
//! encapsulated by the `Communicator` trait: implementors only need to write
//! `send` and `recv` operations for raw byte buffers. Two transports are
//! included, in-process channels (`local`) and a pure-Rust TCP host (`tcp`).
//! The `OrderedCommunicator` wraps any transport with tag matching and
//! provides the collectives (broadcast, reduce, gather) and the group abort
//! notice on top of it.
//!

mod backoff;
pub mod comm;
pub mod local;
pub mod ordered;
pub mod tcp;
pub mod util;
