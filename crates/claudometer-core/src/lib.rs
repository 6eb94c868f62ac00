//! Core library for claudometer: polls claude.ai usage, backs off on
//! failures, and announces threshold crossings once per episode.

pub mod api;
pub mod config;
pub mod monitor;
pub mod notify;
pub mod usage;
