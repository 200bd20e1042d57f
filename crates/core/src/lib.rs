//! # Labwatch Core
//!
//! Core pipeline logic for the labwatch abnormality reporter.
//!
//! This crate contains the export-and-classify pipeline:
//! - Asynchronous bulk-export client (kick-off, status polling, file download)
//! - Observation classification against a reference threshold table
//! - Patient identity index used to label results
//! - Per-run report assembly and rendering
//!
//! **No delivery concerns**: SMTP transports, HTML rendering and scheduling
//! belong to the embedding application; this crate reaches them only through
//! the [`notify::Notifier`] and [`token::TokenProvider`] seams.

pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod notify;
pub mod patients;
pub mod pipeline;
pub mod report;
pub mod thresholds;
pub mod token;
pub mod validation;

pub use classify::{Bucket, ClassifiedBatch, ClassifiedResult, ObservationClassifier, ObservationKind};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::ReportPipeline;
pub use report::RunReport;
pub use thresholds::{ThresholdDefinition, ThresholdTable};

// Re-export the validated text types used across the pipeline surface.
pub use labwatch_types::{EmailAddress, NonEmptyText, TextError};
