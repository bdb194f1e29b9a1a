//! Hosted Widget WebSocket
//!
//! One WebSocket per hosted widget page. The page relays the embed's frame
//! signals and streams microphone audio; the server runs the widget session
//! and streams back status updates and assistant audio.
//!
//! - `protocol`: the JSON message format between page and server.
//! - `session`: the connection lifecycle and event loop.

pub mod protocol;
pub mod session;

pub use session::ws_handler;
