//! ACL handle and lifecycle operations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use netacl_common::{audit_log, AuditCategory, AuditOutcome, AuditRecord, Reverter};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use super::config_rules::ConfigRules;
use super::rule::{AclInfo, AclPut};
use super::subject::SubjectNames;
use super::usage::{self, network_usage};
use super::validate::{validate_name, validate_put};
use crate::config::EngineConfig;
use crate::error::{AclError, ErrorKind, Result};
use crate::script::{to_script_object, ScriptValue};
use crate::sdn::SdnClient;
use crate::store::{AclRecord, AclStore, StoreError};

const AUDIT_SOURCE: &str = "NetworkAcl";
const AUDIT_OBJECT_TYPE: &str = "network_acl";

/// Collaborators and settings shared by every ACL handle.
#[derive(Clone)]
pub struct AclContext {
    pub store: Arc<dyn AclStore>,
    pub sdn: Arc<dyn SdnClient>,
    pub config: Arc<EngineConfig>,
    pub rules: ConfigRules,
}

impl AclContext {
    /// Creates a context with default settings and no config validators.
    pub fn new(store: Arc<dyn AclStore>, sdn: Arc<dyn SdnClient>) -> Self {
        Self {
            store,
            sdn,
            config: Arc::new(EngineConfig::default()),
            rules: ConfigRules::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_rules(mut self, rules: ConfigRules) -> Self {
        self.rules = rules;
        self
    }

    /// Returns the names valid as rule subjects in `project`.
    ///
    /// Queried on every call, since ACLs can be created or renamed at any
    /// time.
    pub async fn subject_names(&self, project: &str) -> Result<SubjectNames> {
        let ids = self.store.acl_ids_by_name(project).await.map_err(|e| {
            AclError::store(
                "Failed getting network ACLs for security ACL subject validation",
                e,
            )
        })?;
        Ok(SubjectNames::new(ids.into_keys()))
    }

    /// Normalises and validates an ACL body for `project`.
    pub async fn validate_config(&self, project: &str, put: &mut AclPut) -> Result<()> {
        let names = self.subject_names(project).await?;
        validate_put(put, &names, &self.rules, &self.config.user_config_prefix)?;
        Ok(())
    }

    async fn name_taken(&self, project: &str, name: &str) -> Result<bool> {
        match self.store.acl_by_name(project, name).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(AclError::store("Failed checking for existing ACL", e)),
        }
    }
}

impl fmt::Debug for AclContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AclContext")
            .field("config", &self.config)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

/// Stages of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    Validating,
    Persisting,
    ScopingSdn,
    SyncingSdn,
    Committed,
    RollingBack,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => write!(f, "validating"),
            Self::Persisting => write!(f, "persisting"),
            Self::ScopingSdn => write!(f, "scoping_sdn"),
            Self::SyncingSdn => write!(f, "syncing_sdn"),
            Self::Committed => write!(f, "committed"),
            Self::RollingBack => write!(f, "rolling_back"),
        }
    }
}

fn enter(stage: UpdateStage) {
    debug!(%stage, "Update stage");
}

/// A loaded network ACL.
///
/// The in-memory info is always normalised, and its rule sequences and
/// config are never absent.
#[derive(Debug)]
pub struct NetworkAcl {
    ctx: AclContext,
    id: i64,
    project: String,
    info: AclInfo,
}

impl NetworkAcl {
    fn from_record(ctx: AclContext, record: AclRecord) -> Self {
        let mut info = record.info;
        info.put.normalise();
        info.used_by = None;

        Self {
            ctx,
            id: record.id,
            project: record.project,
            info,
        }
    }

    /// Loads the ACL `name` from `project`.
    pub async fn load_by_name(ctx: AclContext, project: &str, name: &str) -> Result<Self> {
        let record = ctx
            .store
            .acl_by_name(project, name)
            .await
            .map_err(|e| AclError::store("Failed loading network ACL", e))?;
        Ok(Self::from_record(ctx, record))
    }

    /// Validates and stores a new ACL, returning its handle.
    ///
    /// A new ACL is referenced by nothing, so no SDN state is touched.
    #[instrument(skip(ctx, info), fields(acl = %info.name))]
    pub async fn create(ctx: AclContext, project: &str, mut info: AclInfo) -> Result<Self> {
        let result = Self::try_create(&ctx, project, &mut info).await;

        let mut record = AuditRecord::new(AuditCategory::ResourceCreate, AUDIT_SOURCE, "create")
            .with_object_id(format!("{}/{}", project, info.name))
            .with_object_type(AUDIT_OBJECT_TYPE);
        if let Ok(created) = &result {
            info!(id = created.id, "Created network ACL");
            record = record.with_details(serde_json::json!({
                "id": created.id,
                "ingress_rules": created.info.put.ingress.len(),
                "egress_rules": created.info.put.egress.len(),
            }));
        }
        audit_log!(record_outcome(record, &result));

        result.map(|record| Self::from_record(ctx, record))
    }

    async fn try_create(ctx: &AclContext, project: &str, info: &mut AclInfo) -> Result<AclRecord> {
        validate_name(&info.name)?;

        if ctx.name_taken(project, &info.name).await? {
            return Err(AclError::NameExists {
                name: info.name.clone(),
            });
        }

        ctx.validate_config(project, &mut info.put).await?;
        info.used_by = None;

        let id = ctx
            .store
            .create_acl(project, info)
            .await
            .map_err(|e| AclError::store("Failed creating network ACL", e))?;

        ctx.store
            .acl_by_id(id)
            .await
            .map_err(|e| AclError::store("Failed loading created network ACL", e))
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Returns a copy of the ACL, with `used_by` unpopulated.
    pub fn info(&self) -> AclInfo {
        let mut info = self.info.clone();
        info.used_by = None;
        info
    }

    pub fn context(&self) -> &AclContext {
        &self.ctx
    }

    async fn usage(&self, first_only: bool) -> Result<Vec<String>> {
        usage::used_by(
            self.ctx.store.as_ref(),
            &self.ctx.config,
            &self.project,
            &self.info.name,
            first_only,
        )
        .await
        .map_err(|e| AclError::store("Failed getting ACL usage", e))
    }

    /// Returns the API endpoints referencing this ACL.
    ///
    /// Order is not meaningful.
    pub async fn used_by(&self) -> Result<Vec<String>> {
        self.usage(false).await
    }

    async fn is_used(&self) -> Result<bool> {
        Ok(!self.usage(true).await?.is_empty())
    }

    /// Returns the ACL as a read-only script object, with usage populated.
    pub async fn script_value(&self) -> Result<ScriptValue> {
        let mut info = self.info();
        info.used_by = Some(self.used_by().await?);
        Ok(to_script_object(&info).into())
    }

    /// Returns a fingerprint of the ACL's name and body.
    pub fn etag(&self) -> serde_json::Result<String> {
        etag(&self.info)
    }

    /// Replaces the ACL body, keeping store and SDN state consistent.
    ///
    /// On failure after the store write, every applied step is reverted and
    /// the in-memory body is restored before the error is returned.
    #[instrument(skip(self, put), fields(project = %self.project, acl = %self.info.name))]
    pub async fn update(&mut self, put: AclPut) -> Result<()> {
        let result = self.try_update(put).await;

        let mut record = AuditRecord::new(AuditCategory::ResourceModify, AUDIT_SOURCE, "update")
            .with_object_id(self.object_id())
            .with_object_type(AUDIT_OBJECT_TYPE);
        if result.is_ok() {
            record = record.with_details(serde_json::json!({
                "ingress_rules": self.info.put.ingress.len(),
                "egress_rules": self.info.put.egress.len(),
            }));
        }
        audit_log!(record_outcome(record, &result));

        result
    }

    async fn try_update(&mut self, mut put: AclPut) -> Result<()> {
        enter(UpdateStage::Validating);
        self.ctx.validate_config(&self.project, &mut put).await?;

        enter(UpdateStage::Persisting);
        self.ctx
            .store
            .update_acl(self.id, &put)
            .await
            .map_err(|e| AclError::store("Failed updating network ACL", e))?;

        let old = std::mem::replace(&mut self.info.put, put);
        self.info.put.normalise();

        let mut revert = Reverter::new();
        {
            let store = Arc::clone(&self.ctx.store);
            let id = self.id;
            let old = old.clone();
            revert.add("restore stored ACL", async move {
                store.update_acl(id, &old).await.map_err(anyhow::Error::from)
            });
        }

        match self.sync_sdn(&mut revert).await {
            Ok(()) => {
                enter(UpdateStage::Committed);
                revert.success();
                Ok(())
            }
            Err(e) => {
                enter(UpdateStage::RollingBack);
                warn!(error = %e, steps = revert.len(), "Update failed, rolling back");

                let failed = revert.fail().await;
                self.info.put = old;

                let rollback =
                    AuditRecord::new(AuditCategory::Rollback, AUDIT_SOURCE, "update")
                        .with_object_id(self.object_id())
                        .with_object_type(AUDIT_OBJECT_TYPE)
                        .with_details(serde_json::json!({ "failed_steps": failed }));
                audit_log!(if failed == 0 {
                    rollback.with_outcome(AuditOutcome::Success)
                } else {
                    rollback.with_error(format!("{} revert steps failed", failed))
                });

                Err(e)
            }
        }
    }

    /// Pushes the updated ACL to every SDN network it affects.
    async fn sync_sdn(&self, revert: &mut Reverter) -> Result<()> {
        enter(UpdateStage::ScopingSdn);
        let names = [self.info.name.clone()];

        let mut networks = BTreeMap::new();
        network_usage(
            self.ctx.store.as_ref(),
            &self.ctx.config,
            &self.project,
            &names,
            &mut networks,
        )
        .await
        .map_err(|e| AclError::store("Failed getting ACL network usage", e))?;

        networks.retain(|_, n| self.ctx.config.is_sdn_network(&n.network_type));
        if networks.is_empty() {
            debug!("No SDN networks affected");
            return Ok(());
        }

        enter(UpdateStage::SyncingSdn);
        let acl_ids = self
            .ctx
            .store
            .acl_ids_by_name(&self.project)
            .await
            .map_err(|e| {
                AclError::store("Failed getting network ACL IDs for security ACL update", e)
            })?;

        let sdn_revert = self
            .ctx
            .sdn
            .ensure_acls(&self.project, &acl_ids, &networks, &names, true)
            .await
            .map_err(|e| AclError::sdn("Failed ensuring ACL is configured in SDN", e))?;
        revert.extend(sdn_revert);

        audit_log!(
            AuditRecord::new(AuditCategory::ControlPlaneSync, AUDIT_SOURCE, "ensure_acls")
                .with_object_id(self.object_id())
                .with_object_type(AUDIT_OBJECT_TYPE)
                .with_outcome(AuditOutcome::Success)
                .with_details(serde_json::json!({
                    "networks": networks.keys().collect::<Vec<_>>(),
                }))
        );

        self.ctx
            .sdn
            .delete_port_group_if_unused(&self.project, None, &self.info.name)
            .await
            .map_err(|e| AclError::sdn("Failed removing unused SDN port groups", e))?;

        debug!(networks = networks.len(), "Synchronised SDN networks");
        Ok(())
    }

    /// Renames the ACL. Refused while the ACL is in use.
    #[instrument(skip(self), fields(project = %self.project, acl = %self.info.name))]
    pub async fn rename(&mut self, new_name: &str) -> Result<()> {
        let old_name = self.info.name.clone();
        let result = self.try_rename(new_name).await;

        audit_log!(record_outcome(
            AuditRecord::new(AuditCategory::ResourceModify, AUDIT_SOURCE, "rename")
                .with_object_id(format!("{}/{}", self.project, old_name))
                .with_object_type(AUDIT_OBJECT_TYPE)
                .with_details(serde_json::json!({ "new_name": new_name })),
            &result
        ));

        result
    }

    async fn try_rename(&mut self, new_name: &str) -> Result<()> {
        if self.ctx.name_taken(&self.project, new_name).await? {
            return Err(AclError::NameExists {
                name: new_name.to_string(),
            });
        }

        if self.is_used().await? {
            return Err(AclError::InUse {
                name: self.info.name.clone(),
                operation: "rename",
            });
        }

        validate_name(new_name)?;

        self.ctx
            .store
            .rename_acl(self.id, new_name)
            .await
            .map_err(|e| AclError::store("Failed renaming network ACL", e))?;

        self.info.name = new_name.to_string();
        info!(new_name, "Renamed network ACL");
        Ok(())
    }

    /// Deletes the ACL. Refused while the ACL is in use.
    #[instrument(skip(self), fields(project = %self.project, acl = %self.info.name))]
    pub async fn delete(&self) -> Result<()> {
        let result = self.try_delete().await;

        audit_log!(record_outcome(
            AuditRecord::new(AuditCategory::ResourceDelete, AUDIT_SOURCE, "delete")
                .with_object_id(self.object_id())
                .with_object_type(AUDIT_OBJECT_TYPE),
            &result
        ));

        result
    }

    async fn try_delete(&self) -> Result<()> {
        if self.is_used().await? {
            return Err(AclError::InUse {
                name: self.info.name.clone(),
                operation: "delete",
            });
        }

        self.ctx
            .store
            .delete_acl(self.id)
            .await
            .map_err(|e| AclError::store("Failed deleting network ACL", e))?;

        info!("Deleted network ACL");
        Ok(())
    }

    fn object_id(&self) -> String {
        format!("{}/{}", self.project, self.info.name)
    }
}

/// Sets the audit outcome from an operation result.
///
/// Conflicts are policy refusals and recorded as denied.
fn record_outcome<T>(record: AuditRecord, result: &Result<T>) -> AuditRecord {
    match result {
        Ok(_) => record.with_outcome(AuditOutcome::Success),
        Err(e) if e.kind() == ErrorKind::Conflict => {
            record.with_error(e.to_string()).with_outcome(AuditOutcome::Denied)
        }
        Err(e) => record.with_error(e.to_string()),
    }
}

/// Computes the hex SHA-256 fingerprint of an ACL's name and body.
pub fn etag(info: &AclInfo) -> serde_json::Result<String> {
    let fields = (
        &info.name,
        &info.put.description,
        &info.put.ingress,
        &info.put.egress,
        &info.put.config,
    );

    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&fields)?);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::AclRule;
    use crate::sdn::NoopSdnClient;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn context() -> (Arc<MemoryStore>, AclContext) {
        let store = Arc::new(MemoryStore::new());
        let ctx = AclContext::new(store.clone(), Arc::new(NoopSdnClient));
        (store, ctx)
    }

    fn web_put() -> AclPut {
        AclPut {
            description: "Web servers".to_string(),
            ingress: vec![AclRule::new("allow", "enabled")
                .with_source(" 10.0.0.0/24 ")
                .with_protocol("tcp")
                .with_destination_port("80, 443")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_normalises_and_stores() {
        let (store, ctx) = context();
        let acl = NetworkAcl::create(ctx, "default", AclInfo::new("web", web_put()))
            .await
            .unwrap();

        assert_eq!(acl.id(), 1);
        assert_eq!(acl.project(), "default");
        assert_eq!(acl.info().put.ingress[0].source, "10.0.0.0/24");
        assert_eq!(acl.info().put.ingress[0].destination_port, "80,443");

        let stored = store.acl_by_id(1).await.unwrap();
        assert_eq!(stored.info.put, acl.info().put);
    }

    #[tokio::test]
    async fn test_create_rejects_existing_and_invalid_names() {
        let (_store, ctx) = context();
        NetworkAcl::create(ctx.clone(), "default", AclInfo::new("web", AclPut::default()))
            .await
            .unwrap();

        let err = NetworkAcl::create(ctx.clone(), "default", AclInfo::new("web", AclPut::default()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = NetworkAcl::create(ctx, "default", AclInfo::new("@web", AclPut::default()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_script_value_includes_usage() {
        let (store, ctx) = context();
        let acl = NetworkAcl::create(ctx, "default", AclInfo::new("web", web_put()))
            .await
            .unwrap();
        store.add_network(
            "default",
            "br0",
            "bridge",
            [("security.acls".to_string(), "web".to_string())].into(),
        );

        let value = acl.script_value().await.unwrap();
        assert_eq!(value.type_name(), "NetworkACL");
        match value {
            ScriptValue::Object(obj) => {
                assert_eq!(obj.attr("name").unwrap().as_str(), Some("web"));
                assert_eq!(
                    obj.attr("used_by").unwrap(),
                    &ScriptValue::List(vec![ScriptValue::String(
                        "/1.0/networks/br0".to_string()
                    )])
                );
            }
            other => panic!("unexpected {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_load_missing_acl() {
        let (_store, ctx) = context();
        let err = NetworkAcl::load_by_name(ctx, "default", "web")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_without_sdn_networks() {
        let (store, ctx) = context();
        let mut acl = NetworkAcl::create(ctx, "default", AclInfo::new("web", AclPut::default()))
            .await
            .unwrap();

        acl.update(web_put()).await.unwrap();
        assert_eq!(acl.info().put.description, "Web servers");
        assert_eq!(store.acl_by_id(acl.id()).await.unwrap().info.put, acl.info().put);
    }

    #[tokio::test]
    async fn test_invalid_update_has_no_side_effects() {
        let (store, ctx) = context();
        let mut acl = NetworkAcl::create(ctx, "default", AclInfo::new("web", web_put()))
            .await
            .unwrap();
        let before = acl.info();

        let mut put = web_put();
        put.ingress[0].protocol = "icmp4".to_string();
        let err = acl.update(put).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(acl.info(), before);
        assert_eq!(store.acl_by_id(acl.id()).await.unwrap().info.put, before.put);
    }

    #[tokio::test]
    async fn test_rename_and_delete_unused() {
        let (store, ctx) = context();
        let mut acl = NetworkAcl::create(ctx, "default", AclInfo::new("web", AclPut::default()))
            .await
            .unwrap();

        acl.rename("www").await.unwrap();
        assert_eq!(acl.name(), "www");
        assert!(store.acl_by_name("default", "www").await.is_ok());

        acl.delete().await.unwrap();
        assert_eq!(store.acl_count(), 0);
    }

    #[tokio::test]
    async fn test_rename_to_existing_name() {
        let (_store, ctx) = context();
        NetworkAcl::create(ctx.clone(), "default", AclInfo::new("db", AclPut::default()))
            .await
            .unwrap();
        let mut acl = NetworkAcl::create(ctx, "default", AclInfo::new("web", AclPut::default()))
            .await
            .unwrap();

        let err = acl.rename("db").await.unwrap_err();
        assert!(matches!(err, AclError::NameExists { .. }));
        assert_eq!(acl.name(), "web");
    }

    #[tokio::test]
    async fn test_etag_tracks_content() {
        let (_store, ctx) = context();
        let mut acl = NetworkAcl::create(ctx, "default", AclInfo::new("web", AclPut::default()))
            .await
            .unwrap();

        let before = acl.etag().unwrap();
        assert_eq!(before.len(), 64);
        assert_eq!(before, etag(&acl.info()).unwrap());

        acl.update(web_put()).await.unwrap();
        assert_ne!(acl.etag().unwrap(), before);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(UpdateStage::ScopingSdn.to_string(), "scoping_sdn");
        assert_eq!(UpdateStage::RollingBack.to_string(), "rolling_back");
    }
}
