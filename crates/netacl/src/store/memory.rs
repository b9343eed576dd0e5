//! In-memory store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    AclRecord, AclStore, DeviceConfig, Devices, InstanceRecord, NetworkRecord, ProfileRecord,
    StoreError,
};
use crate::acl::{AclInfo, AclPut};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    acls: BTreeMap<i64, AclRecord>,
    /// (project, name) -> network
    networks: BTreeMap<(String, String), NetworkRecord>,
    /// (project, name) -> profile
    profiles: BTreeMap<(String, String), ProfileRecord>,
    instances: Vec<InstanceRecord>,
    /// Projects that use another project's networks.
    network_projects: BTreeMap<String, String>,
}

impl Inner {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn network_project<'a>(&'a self, project: &'a str) -> &'a str {
        self.network_projects
            .get(project)
            .map(String::as_str)
            .unwrap_or(project)
    }

    fn acl_mut(&mut self, id: i64) -> Result<&mut AclRecord, StoreError> {
        self.acls
            .get_mut(&id)
            .ok_or_else(|| StoreError::acl_not_found(format!("id {}", id)))
    }
}

/// [`AclStore`] backed by process memory.
///
/// Ids are generated sequentially from 1. ACL names are unique per project.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `project` use the networks of `network_project`.
    pub fn set_network_project(&self, project: &str, network_project: &str) {
        self.inner
            .lock()
            .network_projects
            .insert(project.to_string(), network_project.to_string());
    }

    /// Adds a network and returns its id.
    pub fn add_network(
        &self,
        project: &str,
        name: &str,
        network_type: &str,
        config: BTreeMap<String, String>,
    ) -> i64 {
        let mut inner = self.inner.lock();
        let id = inner.alloc_id();
        inner.networks.insert(
            (project.to_string(), name.to_string()),
            NetworkRecord {
                id,
                name: name.to_string(),
                network_type: network_type.to_string(),
                config,
            },
        );
        id
    }

    pub fn add_profile(&self, project: &str, name: &str, devices: Devices) {
        self.inner.lock().profiles.insert(
            (project.to_string(), name.to_string()),
            ProfileRecord {
                name: name.to_string(),
                project: project.to_string(),
                devices,
            },
        );
    }

    /// Adds an instance, expanding the devices of `profiles` in order.
    ///
    /// Local devices override profile devices of the same name.
    pub fn add_instance(&self, project: &str, name: &str, profiles: &[&str], devices: Devices) {
        let mut inner = self.inner.lock();

        let mut expanded = Devices::new();
        for profile in profiles {
            if let Some(p) = inner
                .profiles
                .get(&(project.to_string(), profile.to_string()))
            {
                expanded.extend(p.devices.clone());
            }
        }
        expanded.extend(devices);

        inner.instances.push(InstanceRecord {
            name: name.to_string(),
            project: project.to_string(),
            devices: expanded,
        });
    }

    /// Returns the number of stored ACLs.
    pub fn acl_count(&self) -> usize {
        self.inner.lock().acls.len()
    }
}

/// Builds a NIC device config attached to `network` with the given ACLs.
pub fn nic_device(network: &str, acls: &str) -> DeviceConfig {
    let mut config = DeviceConfig::new();
    config.insert("type".to_string(), "nic".to_string());
    config.insert("network".to_string(), network.to_string());
    if !acls.is_empty() {
        config.insert("security.acls".to_string(), acls.to_string());
    }
    config
}

#[async_trait]
impl AclStore for MemoryStore {
    async fn acl_by_name(&self, project: &str, name: &str) -> Result<AclRecord, StoreError> {
        self.inner
            .lock()
            .acls
            .values()
            .find(|r| r.project == project && r.info.name == name)
            .cloned()
            .ok_or_else(|| StoreError::acl_not_found(name))
    }

    async fn acl_by_id(&self, id: i64) -> Result<AclRecord, StoreError> {
        self.inner
            .lock()
            .acls
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::acl_not_found(format!("id {}", id)))
    }

    async fn acl_ids_by_name(&self, project: &str) -> Result<BTreeMap<String, i64>, StoreError> {
        Ok(self
            .inner
            .lock()
            .acls
            .values()
            .filter(|r| r.project == project)
            .map(|r| (r.info.name.clone(), r.id))
            .collect())
    }

    async fn acls(&self, project: &str) -> Result<Vec<AclRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .acls
            .values()
            .filter(|r| r.project == project)
            .cloned()
            .collect())
    }

    async fn create_acl(&self, project: &str, info: &AclInfo) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        if inner
            .acls
            .values()
            .any(|r| r.project == project && r.info.name == info.name)
        {
            return Err(StoreError::Constraint(format!(
                "ACL {:?} already exists in project {:?}",
                info.name, project
            )));
        }

        let id = inner.alloc_id();
        let mut info = info.clone();
        info.used_by = None;
        inner.acls.insert(
            id,
            AclRecord {
                id,
                project: project.to_string(),
                info,
            },
        );
        Ok(id)
    }

    async fn update_acl(&self, id: i64, put: &AclPut) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.acl_mut(id)?.info.put = put.clone();
        Ok(())
    }

    async fn rename_acl(&self, id: i64, new_name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let project = inner.acl_mut(id)?.project.clone();
        if inner
            .acls
            .values()
            .any(|r| r.id != id && r.project == project && r.info.name == new_name)
        {
            return Err(StoreError::Constraint(format!(
                "ACL {:?} already exists in project {:?}",
                new_name, project
            )));
        }

        inner.acl_mut(id)?.info.name = new_name.to_string();
        Ok(())
    }

    async fn delete_acl(&self, id: i64) -> Result<(), StoreError> {
        self.inner
            .lock()
            .acls
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::acl_not_found(format!("id {}", id)))
    }

    async fn networks(&self, project: &str) -> Result<Vec<NetworkRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .networks
            .iter()
            .filter(|((p, _), _)| p == project)
            .map(|(_, n)| n.clone())
            .collect())
    }

    async fn network(&self, project: &str, name: &str) -> Result<NetworkRecord, StoreError> {
        self.inner
            .lock()
            .networks
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::network_not_found(name))
    }

    async fn profiles(&self, project: &str) -> Result<Vec<ProfileRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .profiles
            .values()
            .filter(|p| inner.network_project(&p.project) == project)
            .cloned()
            .collect())
    }

    async fn instances(&self, project: &str) -> Result<Vec<InstanceRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .instances
            .iter()
            .filter(|i| inner.network_project(&i.project) == project)
            .cloned()
            .collect())
    }
}
