//! termboard - a terminal soundboard client
//!
//! This library exposes the core functionality of termboard for testing
//! and potential embedding use cases.

pub mod app;
pub mod audio;
pub mod catalog;
pub mod client;
pub mod event_log;
pub mod input;
pub mod live;
pub mod router;
pub mod scheduler;
pub mod settings;
pub mod tiles;
pub mod ui;
