//! Spectral ingestion, unit normalisation and comparison, with archive
//! discovery and reference-line lookup.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod remote;
pub mod session;
pub mod units;
