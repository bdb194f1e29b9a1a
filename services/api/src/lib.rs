//! VoicePulse API Library Crate
//!
//! This library contains the web service that hosts the voice widget: the
//! application state, HTTP handlers, the hosted-widget WebSocket session, and
//! routing. The `api` binary is a thin wrapper around this library.

pub mod assets;
pub mod audio_utils;
pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
