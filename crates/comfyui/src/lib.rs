//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, the event-stream listener with
//! reconnection, HTTP API wrappers behind the [`api::EngineApi`] seam, and
//! history parsing used to materialize a finished prompt's artifacts.

pub mod api;
pub mod client;
pub mod events;
pub mod history;
pub mod listener;
pub mod messages;
pub mod reconnect;
