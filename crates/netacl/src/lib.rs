//! Network ACL engine.
//!
//! Validates network ACL rule sets and applies ACL changes to a persistent
//! store and an SDN control plane as one logical transaction.
//!
//! # Modules
//!
//! - [`acl`]: rule model, validators, usage resolution and the [`NetworkAcl`]
//!   handle with its update, rename and delete operations
//! - [`store`]: the [`AclStore`] interface and an in-memory implementation
//! - [`sdn`]: the [`SdnClient`] interface
//! - [`script`]: read-only marshaling of ACLs for embedded scripts
//! - [`config`]: engine settings
//!
//! # Example
//!
//! ```ignore
//! let ctx = AclContext::new(store, sdn);
//! let mut acl = NetworkAcl::load_by_name(ctx, "default", "web").await?;
//! acl.update(put).await?;
//! ```

pub mod acl;
pub mod config;
pub mod error;
pub mod script;
pub mod sdn;
pub mod store;

pub use acl::{AclContext, AclInfo, AclPut, AclRule, ConfigRules, Direction, NetworkAcl};
pub use config::{ConfigError, EngineConfig};
pub use error::{AclError, DependencyError, ErrorKind, Result, RuleError, ValidationError};
pub use sdn::{NetworkAclUsage, NoopSdnClient, SdnClient, SdnError};
pub use store::{AclStore, MemoryStore, StoreError};
