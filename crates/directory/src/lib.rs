//! Port to the organization directory.
//!
//! The directory (users, departments, roles, reporting lines) is owned by an
//! external collaborator. This crate defines the read interface the engine
//! consumes for approver resolution and escalation, plus an in-memory
//! implementation used by tests and in-process deployments.

pub mod in_memory;
pub mod port;

pub use in_memory::InMemoryDirectory;
pub use port::{Directory, DirectoryError, DirectoryResult, DirectoryUser};
