//! Persistent store interface.
//!
//! The engine reads and writes ACLs through [`AclStore`], and reads the
//! entities that may reference an ACL (networks, profiles, instances) so the
//! usage resolver can walk them.
//!
//! # Projects
//!
//! ACLs and networks belong to a project. Profiles and instances are
//! returned for the project whose networks they use, which is not always
//! the project they live in; each record carries its own project so usage
//! URLs can name it.

mod memory;

pub use memory::{nic_device, MemoryStore};

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::acl::{AclInfo, AclPut};

/// Device config key/value pairs.
pub type DeviceConfig = BTreeMap<String, String>;

/// Devices keyed by device name.
pub type Devices = BTreeMap<String, DeviceConfig>;

/// Store error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    /// A uniqueness or referential constraint was violated.
    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Store {operation} failed: {message}")]
    Backend { operation: String, message: String },
}

impl StoreError {
    pub fn acl_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Network ACL",
            name: name.into(),
        }
    }

    pub fn network_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Network",
            name: name.into(),
        }
    }

    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// A stored ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRecord {
    pub id: i64,
    pub project: String,
    pub info: AclInfo,
}

/// A stored network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRecord {
    pub id: i64,
    pub name: String,
    /// Network kind, e.g. `bridge` or `ovn`.
    pub network_type: String,
    pub config: BTreeMap<String, String>,
}

/// A stored profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub name: String,
    pub project: String,
    pub devices: Devices,
}

/// A stored instance, with profile devices already expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub name: String,
    pub project: String,
    pub devices: Devices,
}

/// Persistence operations used by the engine.
#[async_trait]
pub trait AclStore: Send + Sync {
    async fn acl_by_name(&self, project: &str, name: &str) -> Result<AclRecord, StoreError>;

    async fn acl_by_id(&self, id: i64) -> Result<AclRecord, StoreError>;

    /// Returns every ACL name in `project` with its id.
    async fn acl_ids_by_name(&self, project: &str) -> Result<BTreeMap<String, i64>, StoreError>;

    async fn acls(&self, project: &str) -> Result<Vec<AclRecord>, StoreError>;

    /// Inserts a new ACL and returns its generated id.
    async fn create_acl(&self, project: &str, info: &AclInfo) -> Result<i64, StoreError>;

    /// Replaces the body of ACL `id`.
    async fn update_acl(&self, id: i64, put: &AclPut) -> Result<(), StoreError>;

    async fn rename_acl(&self, id: i64, new_name: &str) -> Result<(), StoreError>;

    async fn delete_acl(&self, id: i64) -> Result<(), StoreError>;

    async fn networks(&self, project: &str) -> Result<Vec<NetworkRecord>, StoreError>;

    async fn network(&self, project: &str, name: &str) -> Result<NetworkRecord, StoreError>;

    /// Returns profiles whose NICs attach to networks of `project`.
    async fn profiles(&self, project: &str) -> Result<Vec<ProfileRecord>, StoreError>;

    /// Returns instances whose NICs attach to networks of `project`.
    async fn instances(&self, project: &str) -> Result<Vec<InstanceRecord>, StoreError>;
}
