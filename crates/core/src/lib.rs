//! Core domain types, errors, and constants for the `cairn` task kernel.
//!
//! ## Key Components
//!
//! - **`errors`**: the primary `Error` enum and `Result` alias. Configuration,
//!   execution and lock failures are distinct variants so callers can decide
//!   whether a retry makes sense.
//! - **`spec`**: record types built from ordered field descriptors. Task
//!   inputs and outputs are instances of these.
//! - **`audit`**: audit capabilities and the provenance message model.
//! - **`constants`**: file names of entry-directory artifacts and the
//!   environment variables cairn reads.

pub mod audit;
pub mod constants;
pub mod errors;
pub mod spec;

pub use self::{
    audit::{AuditCapability, AuditFlags, AuditMessage, ProvenanceContext},
    constants::*,
    errors::{Error, Result, ResultExt},
    spec::{FieldSpec, FieldType, Record, RecordType, SpecBase, SpecInfo, SpecRegistry},
};
