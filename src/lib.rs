//! fnhost - local build/invoke orchestrator for serverless functions
//!
//! Turns a function's source directory into an invocable handler through a
//! pluggable runtime, serializes concurrent builds, routes requests to
//! functions, and normalizes runtime failures into 500 responses.

pub mod config;
pub mod functions;
pub mod observability;
