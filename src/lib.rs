//! Trajectory reduction and map matching
//!
//! Reduces dense GPS point sequences to a minimal representative path and
//! optionally snaps that path to a road network through one of two
//! interchangeable matching services.
//!
//! Module structure:
//! - `domain/` - Points, segments, outcomes, coordinate frames, statistics
//! - `services/` - Decimation, simplification, chunking, reconciliation, engine
//! - `io/` - Matching service adapters and the mock service
//! - `infra/` - Configuration, errors, metrics

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
