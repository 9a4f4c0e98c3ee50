//! Shared domain foundation.
//!
//! Pure building blocks used by every other crate: strongly-typed ids, the
//! domain error model, the polymorphic entity reference + snapshot, and
//! decimal helpers for money/percentage math. No infrastructure concerns.

pub mod decimal;
pub mod entity;
pub mod error;
pub mod id;

pub use decimal::{Percent, round2};
pub use entity::{EntityRef, EntitySnapshot};
pub use error::{DomainError, DomainResult};
pub use id::{DepartmentId, InstanceId, NotificationId, ProjectId, RoleCode, TemplateId, UserId};
