//! Shared plumbing for the ticker workspace: tracing setup, per-tick
//! correlation ids and span helpers.

pub mod logger;
