//! HTTP request handlers.
//!
//! Handlers are thin: they pull what they need from [`AppState`] and
//! delegate to the runtime.
//!
//! [`AppState`]: crate::state::AppState

pub mod activity;
pub mod agents;
pub mod health;
pub mod processes;
pub mod servers;
pub mod templates;
