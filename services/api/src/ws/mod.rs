//! WebSocket Quiz Sessions
//!
//! Each WebSocket connection owns one session orchestrator. Submodules:
//!
//! - `protocol`: the JSON message format between browser and server.
//! - `session`: the connection lifecycle and message loop.
//! - `speech`: a speech decorator that mirrors tutor lines to the browser.

pub mod protocol;
pub mod session;
mod speech;

pub use session::ws_handler;
