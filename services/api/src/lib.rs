//! MedTutor API Library Crate
//!
//! This library contains the web layer of the quiz tutor: configuration,
//! application state, REST handlers over the question bank, the WebSocket
//! quiz endpoint, and routing. The `api` binary is a thin wrapper around it.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
