//! assessor-core — scoring, interpretation, and the evaluation engine.
//!
//! This crate holds the assessment domain model, the strategy libraries and
//! their registry, the batch processors, and the orchestrator that turns a
//! submitted answer sheet into scores, risk levels, and a report.

pub mod assessment;
pub mod batch;
pub mod engine;
pub mod error;
pub mod interpretation;
pub mod model;
pub mod parser;
pub mod registry;
pub mod report;
pub mod score;
pub mod scoring;
pub mod traits;
pub mod validation;
