//! Report chat client
//!
//! Streams answers about a report from the chat backend: a reconnecting
//! WebSocket transport, a pure conversation state machine, and a session
//! runtime that ties them to history fetched over REST.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod conversation;
pub mod runtime;
pub mod session_store;
pub mod transport;
