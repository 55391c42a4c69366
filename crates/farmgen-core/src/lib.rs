//! farmgen-core – catalog storage, content-generation adapters and the
//! product review workflow.
//!
//! The crate has no HTTP surface of its own; `farmgen-server` wires these
//! pieces into an Axum router.  Every external collaborator (LLM completion
//! API, image-generation API, S3-compatible object storage) sits behind a
//! trait so that it can be swapped for an in-memory fake in tests.

pub mod config;
pub mod entities;
pub mod error;
pub mod http;
pub mod services;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use entities::SqliteStore;
pub use error::{CatalogError, FieldError, FileError, StoreError, UpstreamError, UpstreamErrorKind};
