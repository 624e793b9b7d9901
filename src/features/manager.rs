//! Feature Manager
//!
//! Orchestrates the feature lifecycle of a cluster group:
//! - Enable / update: validate properties with the handler, then upsert the record
//! - Disable: flip the persisted flag (reconciliation is a separate call)
//! - Reconcile: drive every selected feature's handler toward its persisted state
//! - Status: per-member status from the handler

use crate::domain::cluster::ClusterGroup;
use crate::domain::feature::{Feature, FeatureRecord, FeatureResponse};
use crate::domain::ports::{FeatureHandlerRef, FeatureRepositoryRef};
use crate::error::{Error, FeatureFailure, Result};
use crate::features::registry::FeatureRegistry;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point for feature operations on cluster groups
pub struct FeatureManager {
    registry: Arc<FeatureRegistry>,
    repository: FeatureRepositoryRef,
}

impl FeatureManager {
    pub fn new(registry: Arc<FeatureRegistry>, repository: FeatureRepositoryRef) -> Self {
        Self {
            registry,
            repository,
        }
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn feature_handler(&self, name: &str) -> Result<FeatureHandlerRef> {
        self.registry.handler(name)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All persisted features of a group, keyed by name
    pub async fn get_features(&self, cluster_group: &ClusterGroup) -> Result<BTreeMap<String, Feature>> {
        let records = match self.repository.get_all_features(cluster_group.id).await {
            Ok(records) => records,
            Err(e) if e.is_not_found() => return Ok(BTreeMap::new()),
            Err(e) => return Err(e),
        };

        let mut features = BTreeMap::new();
        for record in records {
            let properties = match decode_properties(&record) {
                Ok(properties) => properties,
                Err(e) => {
                    warn!(
                        cluster_group_id = cluster_group.id,
                        feature = %record.name,
                        error = %e,
                        "could not decode feature properties"
                    );
                    Value::Null
                }
            };
            let feature = to_feature(cluster_group, record, properties);
            features.insert(feature.name.clone(), feature);
        }

        Ok(features)
    }

    pub async fn get_feature(&self, cluster_group: &ClusterGroup, name: &str) -> Result<Feature> {
        let record = self.repository.get_feature(cluster_group.id, name).await?;
        let properties = decode_properties(&record)?;
        Ok(to_feature(cluster_group, record, properties))
    }

    pub async fn get_enabled_features(
        &self,
        cluster_group: &ClusterGroup,
    ) -> Result<BTreeMap<String, Feature>> {
        let mut features = self.get_features(cluster_group).await?;
        features.retain(|_, feature| feature.enabled);
        Ok(features)
    }

    /// Member status from the feature's handler, `None` without a handler
    pub async fn feature_status(&self, feature: &Feature) -> Result<Option<BTreeMap<u32, String>>> {
        match self.registry.handler(&feature.name) {
            Ok(handler) => Ok(Some(handler.members_status(feature).await?)),
            Err(_) => Ok(None),
        }
    }

    /// Feature record plus live member status when enabled
    pub async fn describe_feature(
        &self,
        cluster_group: &ClusterGroup,
        name: &str,
    ) -> Result<FeatureResponse> {
        let feature = self.get_feature(cluster_group, name).await?;
        let status = if feature.enabled {
            self.feature_status(&feature).await?
        } else {
            None
        };
        Ok(FeatureResponse::new(&feature, status))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn enable_feature(
        &self,
        name: &str,
        cluster_group: &ClusterGroup,
        properties: &Value,
    ) -> Result<()> {
        self.set_feature_params(name, cluster_group, properties)
            .await
            .map_err(|e| e.context("could not enable feature"))
    }

    pub async fn update_feature(
        &self,
        name: &str,
        cluster_group: &ClusterGroup,
        properties: &Value,
    ) -> Result<()> {
        self.set_feature_params(name, cluster_group, properties)
            .await
            .map_err(|e| e.context("could not update feature"))
    }

    async fn set_feature_params(
        &self,
        name: &str,
        cluster_group: &ClusterGroup,
        properties: &Value,
    ) -> Result<()> {
        let handler = self.registry.handler(name)?;
        handler.validate_properties(cluster_group, properties)?;

        let mut record = match self.repository.get_feature(cluster_group.id, name).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => FeatureRecord::new(cluster_group.id, name),
            Err(e) => return Err(e),
        };

        record.enabled = true;
        record.properties = Some(serde_json::to_string(properties)?);
        record.touch();
        self.repository.save_feature(&record).await?;

        info!(
            cluster_group_id = cluster_group.id,
            feature = name,
            "feature enabled"
        );
        Ok(())
    }

    /// Mark a feature disabled
    ///
    /// Teardown happens on the next [`FeatureManager::reconcile_features`].
    pub async fn disable_feature(&self, name: &str, cluster_group: &ClusterGroup) -> Result<()> {
        self.mark_disabled(name, cluster_group)
            .await
            .map_err(|e| e.context("could not disable feature"))
    }

    async fn mark_disabled(&self, name: &str, cluster_group: &ClusterGroup) -> Result<()> {
        self.registry.handler(name)?;

        // Unlike enable, a missing record is an error here
        let mut record = self.repository.get_feature(cluster_group.id, name).await?;

        record.enabled = false;
        record.touch();
        self.repository.save_feature(&record).await?;

        info!(
            cluster_group_id = cluster_group.id,
            feature = name,
            "feature disabled"
        );
        Ok(())
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Reconcile the features of a group
    ///
    /// Every selected feature is attempted. Outcomes are recorded in the
    /// feature's `last_reconcile_error`, and failures are returned together
    /// as [`Error::FeaturesFailed`].
    pub async fn reconcile_features(
        &self,
        cluster_group: &ClusterGroup,
        only_enabled: bool,
    ) -> Result<()> {
        debug!(
            cluster_group = %cluster_group.name,
            only_enabled,
            "reconcile features"
        );

        let features = self.get_features(cluster_group).await?;
        let mut failures = Vec::new();

        for (name, feature) in features {
            if !feature.enabled && only_enabled {
                continue;
            }

            let handler = match self.registry.handler(&name) {
                Ok(handler) => handler,
                Err(_) => {
                    debug!(feature = %name, "no handler registered for cluster group feature");
                    continue;
                }
            };

            let outcome = reconcile_one(&handler, &feature).await;
            self.record_outcome(cluster_group, &feature, &outcome, &mut failures)
                .await?;
        }

        into_result(failures)
    }

    /// Disable and tear down every enabled feature of a group
    pub async fn disable_features(&self, cluster_group: &ClusterGroup) -> Result<()> {
        debug!(cluster_group = %cluster_group.name, "disable all enabled features");

        let features = self.get_enabled_features(cluster_group).await?;
        let mut failures = Vec::new();

        for (name, mut feature) in features {
            let handler = self.registry.handler(&name)?;

            let mut record = self.repository.get_feature(cluster_group.id, &name).await?;
            record.enabled = false;
            record.touch();
            self.repository.save_feature(&record).await?;

            feature.enabled = false;
            let outcome = reconcile_one(&handler, &feature).await;
            self.record_outcome(cluster_group, &feature, &outcome, &mut failures)
                .await?;
        }

        into_result(failures)
    }

    async fn record_outcome(
        &self,
        cluster_group: &ClusterGroup,
        feature: &Feature,
        outcome: &Result<()>,
        failures: &mut Vec<FeatureFailure>,
    ) -> Result<()> {
        let last_error = match outcome {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    cluster_group = %cluster_group.name,
                    feature = %feature.name,
                    error = %e,
                    "feature reconciliation failed"
                );
                failures.push(FeatureFailure {
                    feature: feature.name.clone(),
                    error: e.to_string(),
                });
                Some(e.to_string())
            }
        };

        if feature.last_reconcile_error == last_error {
            return Ok(());
        }

        let mut record = self
            .repository
            .get_feature(cluster_group.id, &feature.name)
            .await?;
        record.last_reconcile_error = last_error;
        record.touch();
        self.repository.save_feature(&record).await
    }
}

async fn reconcile_one(handler: &FeatureHandlerRef, feature: &Feature) -> Result<()> {
    handler.validate_state(feature).await?;
    handler.reconcile_state(feature).await
}

fn into_result(failures: Vec<FeatureFailure>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::FeaturesFailed { failures })
    }
}

fn decode_properties(record: &FeatureRecord) -> Result<Value> {
    match record.properties.as_deref() {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw).map_err(|e| Error::CorruptFeature {
            feature: record.name.clone(),
            reason: e.to_string(),
        }),
    }
}

fn to_feature(cluster_group: &ClusterGroup, record: FeatureRecord, properties: Value) -> Feature {
    Feature {
        cluster_group: cluster_group.clone(),
        name: record.name,
        enabled: record.enabled,
        properties,
        last_reconcile_error: record.last_reconcile_error,
    }
}
