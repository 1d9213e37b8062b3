//! Core domain types and pure functions for the gridcover coverage
//! aggregation service.
//!
//! This crate holds everything that needs no I/O:
//! - Tile indexing on the fixed-zoom coverage grid
//! - Signal-quality bucketing
//! - Great-circle distance
//! - Inbound event payloads
//! - Configuration types shared across crates

pub mod config;
pub mod geo;
pub mod messages;
pub mod signal;
pub mod tile;
