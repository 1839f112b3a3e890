//! Infrastructure layer: config persistence and TCP socket plumbing.

pub mod config;
pub mod network;
