//! Common orchestration infrastructure for network ACL management.
//!
//! - [`Reverter`]: ordered plan of compensating actions for multi-step
//!   operations that touch both persisted state and a control plane
//! - [`audit`]: structured audit records for configuration changes
//!
//! # Example
//!
//! ```ignore
//! use netacl_common::Reverter;
//!
//! let mut revert = Reverter::new();
//! store.update(id, &new).await?;
//! revert.add("restore config", async move { store.update(id, &old).await });
//!
//! if let Err(e) = sync_control_plane().await {
//!     revert.fail().await;
//!     return Err(e);
//! }
//! revert.success();
//! ```

pub mod audit;
mod revert;

pub use audit::{AuditCategory, AuditOutcome, AuditRecord};
pub use revert::{RevertStep, Reverter};
