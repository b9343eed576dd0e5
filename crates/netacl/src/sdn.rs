//! SDN control plane client interface.
//!
//! The engine never speaks the control plane's protocol. It asks the client
//! to make enforcement state match a set of ACLs, and to drop an ACL's port
//! group once nothing references it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use netacl_common::Reverter;
use thiserror::Error;

/// SDN client error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdnError {
    #[error("SDN control plane unavailable: {0}")]
    Unavailable(String),

    #[error("SDN {operation} rejected: {message}")]
    Rejected { operation: String, message: String },
}

impl SdnError {
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// A network affected by an ACL change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAclUsage {
    pub id: i64,
    pub name: String,
    pub network_type: String,
    pub config: BTreeMap<String, String>,
}

/// Control plane operations used by the engine.
#[async_trait]
pub trait SdnClient: Send + Sync {
    /// Ensures port groups and rules exist for `root_acls` and every ACL they
    /// reference, for the given networks.
    ///
    /// `acl_ids` maps every ACL name in the project to its id. With
    /// `reapply` set, rules of existing groups are rewritten. The returned
    /// reverter undoes whatever this call changed.
    async fn ensure_acls(
        &self,
        project: &str,
        acl_ids: &BTreeMap<String, i64>,
        networks: &BTreeMap<String, NetworkAclUsage>,
        root_acls: &[String],
        reapply: bool,
    ) -> Result<Reverter, SdnError>;

    /// Deletes the port group of `acl` if no port references it.
    ///
    /// With `network` set, only that network's per-network group is
    /// considered. A missing group is not an error.
    async fn delete_port_group_if_unused(
        &self,
        project: &str,
        network: Option<&str>,
        acl: &str,
    ) -> Result<(), SdnError>;
}

/// Client for deployments without an SDN control plane.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSdnClient;

#[async_trait]
impl SdnClient for NoopSdnClient {
    async fn ensure_acls(
        &self,
        _project: &str,
        _acl_ids: &BTreeMap<String, i64>,
        _networks: &BTreeMap<String, NetworkAclUsage>,
        _root_acls: &[String],
        _reapply: bool,
    ) -> Result<Reverter, SdnError> {
        Ok(Reverter::new())
    }

    async fn delete_port_group_if_unused(
        &self,
        _project: &str,
        _network: Option<&str>,
        _acl: &str,
    ) -> Result<(), SdnError> {
        Ok(())
    }
}
