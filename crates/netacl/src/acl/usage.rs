//! ACL usage resolution.
//!
//! Finds every entity that references one of a set of ACL names. Entities
//! are visited cheapest first:
//!
//! 1. Networks whose `security.acls` lists the ACL
//! 2. Profiles with a NIC whose `security.acls` lists the ACL
//! 3. Other ACLs naming it as an ingress source or egress destination
//! 4. Instances with such a NIC
//!
//! The walk is re-run for every query; results are never cached.

use std::collections::BTreeMap;

use tracing::debug;

use super::rule::split_trim;
use crate::config::EngineConfig;
use crate::sdn::NetworkAclUsage;
use crate::store::{
    AclRecord, AclStore, DeviceConfig, InstanceRecord, NetworkRecord, ProfileRecord, StoreError,
};

/// Config key listing the ACLs applied to a network or NIC.
pub const SECURITY_ACLS_KEY: &str = "security.acls";

/// One reference to a searched ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Usage {
    Network(NetworkRecord),
    /// A profile, with the matching NIC.
    Profile {
        profile: ProfileRecord,
        nic: DeviceConfig,
    },
    Acl(AclRecord),
    /// An instance, with the matching NIC.
    Instance {
        instance: InstanceRecord,
        nic: DeviceConfig,
    },
}

impl Usage {
    /// Returns the API endpoint of the referencing entity.
    ///
    /// Networks and ACLs live in the searched ACL's project; profiles and
    /// instances carry their own.
    pub fn url(&self, config: &EngineConfig, acl_project: &str) -> String {
        let api = &config.api_version;
        match self {
            Usage::Network(n) => format!(
                "/{}/networks/{}{}",
                api,
                n.name,
                config.project_suffix(acl_project)
            ),
            Usage::Profile { profile, .. } => format!(
                "/{}/profiles/{}{}",
                api,
                profile.name,
                config.project_suffix(&profile.project)
            ),
            Usage::Acl(acl) => format!(
                "/{}/network-acls/{}{}",
                api,
                acl.info.name,
                config.project_suffix(acl_project)
            ),
            Usage::Instance { instance, .. } => format!(
                "/{}/instances/{}{}",
                api,
                instance.name,
                config.project_suffix(&instance.project)
            ),
        }
    }
}

fn lists_any(list: Option<&String>, names: &[String]) -> bool {
    list.map(|list| {
        split_trim(list)
            .into_iter()
            .any(|acl| names.iter().any(|n| n == acl))
    })
    .unwrap_or(false)
}

fn nic_network(dev: &DeviceConfig) -> Option<&str> {
    dev.get("network")
        .map(String::as_str)
        .filter(|network| !network.is_empty())
}

/// NICs listing any of `names`. Only NICs attached to a managed network
/// can carry ACLs; others are ignored.
fn matching_nics<'a>(
    devices: &'a BTreeMap<String, DeviceConfig>,
    names: &'a [String],
) -> impl Iterator<Item = &'a DeviceConfig> + 'a {
    devices.values().filter(move |dev| {
        dev.get("type").map(String::as_str) == Some("nic")
            && nic_network(dev).is_some()
            && lists_any(dev.get(SECURITY_ACLS_KEY), names)
    })
}

fn acl_references_any(acl: &AclRecord, names: &[String]) -> bool {
    let named = |subject: &&str| names.iter().any(|n| n == subject);

    acl.info.put.ingress.iter().any(|r| r.sources().iter().any(named))
        || acl.info.put.egress.iter().any(|r| r.destinations().iter().any(named))
}

/// Collects the entities in `project` referencing any of `names`.
///
/// With `first_only` the walk stops at the first match.
pub async fn find_usage(
    store: &dyn AclStore,
    project: &str,
    names: &[String],
    first_only: bool,
) -> Result<Vec<Usage>, StoreError> {
    let mut found = Vec::new();

    for network in store.networks(project).await? {
        if lists_any(network.config.get(SECURITY_ACLS_KEY), names) {
            found.push(Usage::Network(network));
            if first_only {
                return Ok(found);
            }
        }
    }

    for profile in store.profiles(project).await? {
        let nics: Vec<DeviceConfig> = matching_nics(&profile.devices, names).cloned().collect();
        for nic in nics {
            found.push(Usage::Profile {
                profile: profile.clone(),
                nic,
            });
            if first_only {
                return Ok(found);
            }
        }
    }

    for acl in store.acls(project).await? {
        // An ACL in the searched set referencing itself or a sibling is not usage.
        if names.contains(&acl.info.name) {
            continue;
        }

        if acl_references_any(&acl, names) {
            found.push(Usage::Acl(acl));
            if first_only {
                return Ok(found);
            }
        }
    }

    for instance in store.instances(project).await? {
        let nics: Vec<DeviceConfig> = matching_nics(&instance.devices, names).cloned().collect();
        for nic in nics {
            found.push(Usage::Instance {
                instance: instance.clone(),
                nic,
            });
            if first_only {
                return Ok(found);
            }
        }
    }

    Ok(found)
}

/// Returns the API endpoints referencing `name`, each listed once.
pub async fn used_by(
    store: &dyn AclStore,
    config: &EngineConfig,
    project: &str,
    name: &str,
    first_only: bool,
) -> Result<Vec<String>, StoreError> {
    let usages = find_usage(store, project, &[name.to_string()], first_only).await?;

    let mut urls: Vec<String> = Vec::with_capacity(usages.len());
    for usage in &usages {
        let url = usage.url(config, project);
        if !urls.contains(&url) {
            urls.push(url);
        }
    }

    debug!(project, acl = name, count = urls.len(), "Resolved ACL usage");
    Ok(urls)
}

/// Adds to `networks` every ACL-capable network affected by `names`.
///
/// Networks are reached directly or through a NIC's `network` key. ACLs
/// referencing `names` contribute nothing, since they carry no network.
pub async fn network_usage(
    store: &dyn AclStore,
    config: &EngineConfig,
    project: &str,
    names: &[String],
    networks: &mut BTreeMap<String, NetworkAclUsage>,
) -> Result<(), StoreError> {
    for usage in find_usage(store, project, names, false).await? {
        let network = match usage {
            Usage::Network(network) => network,
            Usage::Profile { nic, .. } | Usage::Instance { nic, .. } => {
                let Some(name) = nic_network(&nic) else {
                    continue;
                };
                store.network(project, name).await?
            }
            Usage::Acl(_) => continue,
        };

        if !config.is_acl_network(&network.network_type) {
            continue;
        }

        networks
            .entry(network.name.clone())
            .or_insert_with(|| NetworkAclUsage {
                id: network.id,
                name: network.name,
                network_type: network.network_type,
                config: network.config,
            });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{AclInfo, AclPut, AclRule};
    use crate::store::{nic_device, Devices, MemoryStore};
    use pretty_assertions::assert_eq;

    fn acls_config(acls: &str) -> BTreeMap<String, String> {
        [(SECURITY_ACLS_KEY.to_string(), acls.to_string())].into()
    }

    fn nic(network: &str, acls: &str) -> Devices {
        [("eth0".to_string(), nic_device(network, acls))].into()
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_network("default", "br0", "bridge", acls_config("web"));
        store.add_network("default", "ovn0", "ovn", BTreeMap::new());
        store.add_network("default", "mv0", "macvlan", acls_config("web"));
        store.add_profile("default", "webp", nic("ovn0", "db, web"));
        store.add_instance("default", "c1", &[], nic("ovn0", "web"));

        let referencing = AclPut {
            ingress: vec![AclRule::new("allow", "enabled").with_source("web")],
            ..Default::default()
        };
        store
            .create_acl("default", &AclInfo::new("app", referencing))
            .await
            .unwrap();
        store
            .create_acl("default", &AclInfo::new("web", AclPut::default()))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_used_by_walk_order() {
        let store = seeded().await;
        let urls = used_by(&store, &EngineConfig::default(), "default", "web", false)
            .await
            .unwrap();

        assert_eq!(
            urls,
            vec![
                "/1.0/networks/br0",
                "/1.0/networks/mv0",
                "/1.0/profiles/webp",
                "/1.0/network-acls/app",
                "/1.0/instances/c1",
            ]
        );
    }

    #[tokio::test]
    async fn test_first_only_stops_early() {
        let store = seeded().await;
        let urls = used_by(&store, &EngineConfig::default(), "default", "web", true)
            .await
            .unwrap();
        assert_eq!(urls, vec!["/1.0/networks/br0"]);
    }

    #[tokio::test]
    async fn test_first_only_stops_at_profile() {
        let store = MemoryStore::new();
        store.add_network("default", "ovn0", "ovn", BTreeMap::new());
        store.add_profile("default", "webp", nic("ovn0", "web"));
        store.add_instance("default", "c1", &[], nic("ovn0", "web"));

        let urls = used_by(&store, &EngineConfig::default(), "default", "web", true)
            .await
            .unwrap();
        assert_eq!(urls, vec!["/1.0/profiles/webp"]);
    }

    #[tokio::test]
    async fn test_first_only_stops_at_instance() {
        let store = MemoryStore::new();
        store.add_network("default", "ovn0", "ovn", BTreeMap::new());
        let devices: Devices = [
            ("eth0".to_string(), nic_device("ovn0", "web")),
            ("eth1".to_string(), nic_device("ovn0", "web")),
        ]
        .into();
        store.add_instance("default", "c1", &[], devices.clone());
        store.add_instance("default", "c2", &[], devices);

        let usages = find_usage(&store, "default", &["web".to_string()], true)
            .await
            .unwrap();
        assert_eq!(usages.len(), 1);
        assert!(matches!(&usages[0], Usage::Instance { instance, .. } if instance.name == "c1"));

        let urls = used_by(&store, &EngineConfig::default(), "default", "web", false)
            .await
            .unwrap();
        assert_eq!(urls, vec!["/1.0/instances/c1", "/1.0/instances/c2"]);
    }

    #[tokio::test]
    async fn test_unmanaged_nic_is_not_usage() {
        let store = MemoryStore::new();
        let mut bridged = nic_device("", "web");
        bridged.insert("nictype".to_string(), "bridged".to_string());
        bridged.insert("parent".to_string(), "lxdbr0".to_string());
        store.add_instance("default", "c1", &[], [("eth0".to_string(), bridged)].into());

        let urls = used_by(&store, &EngineConfig::default(), "default", "web", false)
            .await
            .unwrap();
        assert!(urls.is_empty());

        let mut networks = BTreeMap::new();
        network_usage(
            &store,
            &EngineConfig::default(),
            "default",
            &["web".to_string()],
            &mut networks,
        )
        .await
        .unwrap();
        assert!(networks.is_empty());
    }

    #[tokio::test]
    async fn test_unused_acl() {
        let store = seeded().await;
        let urls = used_by(&store, &EngineConfig::default(), "default", "app", false)
            .await
            .unwrap();
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn test_non_default_project_urls() {
        let store = MemoryStore::new();
        store.add_network("tenant", "br0", "bridge", acls_config("web"));
        store.add_instance("other", "c1", &[], nic("br0", "web"));
        store.set_network_project("other", "tenant");

        let urls = used_by(&store, &EngineConfig::default(), "tenant", "web", false)
            .await
            .unwrap();
        assert_eq!(
            urls,
            vec!["/1.0/networks/br0?project=tenant", "/1.0/instances/c1?project=other"]
        );
    }

    #[tokio::test]
    async fn test_network_usage_skips_unsupported_kinds() {
        let store = seeded().await;
        let mut networks = BTreeMap::new();
        network_usage(
            &store,
            &EngineConfig::default(),
            "default",
            &["web".to_string()],
            &mut networks,
        )
        .await
        .unwrap();

        assert_eq!(networks.keys().collect::<Vec<_>>(), vec!["br0", "ovn0"]);
        assert_eq!(networks["ovn0"].network_type, "ovn");
    }

    #[tokio::test]
    async fn test_network_usage_missing_network() {
        let store = MemoryStore::new();
        store.add_instance("default", "c1", &[], nic("gone", "web"));

        let mut networks = BTreeMap::new();
        let err = network_usage(
            &store,
            &EngineConfig::default(),
            "default",
            &["web".to_string()],
            &mut networks,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
