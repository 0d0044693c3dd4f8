//! Shared document model for `Planboard`.
//!
//! Everything in this crate is synchronous and free of I/O: the store-side
//! field representation, timestamp normalization, the `Task` and `Project`
//! records decoded from documents, and the calendar [`day::DayKey`].

pub mod day;
pub mod document;
pub mod project;
pub mod task;
pub mod timestamp;

use thiserror::Error;

/// Errors produced when a store document cannot be turned into a record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A required field is absent (or `null`).
    #[error("missing field: {0}")]
    MissingField(&'static str),
    /// A field holds a value of the wrong kind.
    #[error("field {field} has the wrong type (expected {expected})")]
    WrongType {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable name of the expected kind.
        expected: &'static str,
    },
    /// The task title is empty after trimming.
    #[error("task title cannot be empty")]
    EmptyTitle,
    /// The status string is not one of the closed set.
    #[error("unknown task status: {0}")]
    UnknownStatus(String),
    /// The category string is not one of the closed set.
    #[error("unknown task category: {0}")]
    UnknownCategory(String),
    /// A JSON value has no field-value equivalent.
    #[error("unsupported JSON value: {0}")]
    UnsupportedJson(String),
}
