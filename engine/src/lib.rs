//! Elicit Engine Library
//!
//! Per-turn decision engine for adaptive interviews: tracks concept state,
//! detects signals, classifies the interview phase, and ranks strategy and
//! concept candidates. It is used by both the main binary and integration
//! tests.

/// Configuration management module
pub mod config;

/// Concept-graph aggregates
pub mod graph;

/// Concept state tracker
pub mod tracker;

/// Signal detectors and the detector registry
pub mod signals;

/// Interview phase detection
pub mod phase;

/// Candidate scoring and ranking
pub mod scoring;

/// Session state and the session store contract
pub mod session;

/// Turn orchestrator
pub mod orchestrator;

/// Database persistence module
pub mod db;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
