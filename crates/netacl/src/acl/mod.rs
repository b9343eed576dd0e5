//! Network ACLs.
//!
//! # Architecture
//!
//! ```text
//! caller ──► NetworkAcl::{update, rename, delete}
//!              │
//!              ├─► validate (rule-set, config, name)
//!              ├─► usage (in-use checks, SDN network scoping)
//!              ├─► AclStore (persist, revert step recorded)
//!              └─► SdnClient (ensure ACLs, revert step recorded)
//! ```
//!
//! A failed update runs the recorded revert steps in reverse order before the
//! error is returned.

mod config_rules;
mod orch;
mod rule;
mod subject;
mod types;
pub mod usage;
pub mod validate;

pub use config_rules::{ConfigRules, ConfigValidator};
pub use orch::{etag, AclContext, NetworkAcl, UpdateStage};
pub use rule::{split_trim, AclInfo, AclPut, AclRule};
pub use subject::{
    address_family, classify, names_allowed, SubjectKind, SubjectNames, SubjectSummary,
    EXTERNAL_SUBJECTS, INTERNAL_SUBJECTS,
};
pub use types::{Direction, Protocol, RuleAction, RuleField, RuleState};
pub use usage::{used_by, Usage};
