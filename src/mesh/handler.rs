//! Feature handler for the service mesh

use super::config::{MeshConfig, MeshSettings};
use super::reconciler::MeshReconciler;
use crate::domain::cluster::ClusterGroup;
use crate::domain::feature::Feature;
use crate::domain::ports::{DeploymentInstallerRef, FeatureHandler};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

pub struct ServiceMeshFeatureHandler {
    settings: Arc<MeshSettings>,
    installer: DeploymentInstallerRef,
}

impl ServiceMeshFeatureHandler {
    pub fn new(settings: Arc<MeshSettings>, installer: DeploymentInstallerRef) -> Self {
        Self {
            settings,
            installer,
        }
    }

    pub fn settings(&self) -> &MeshSettings {
        &self.settings
    }

    fn reconciler(&self, feature: &Feature) -> Result<MeshReconciler> {
        let config = MeshConfig::from_feature(feature)?;
        MeshReconciler::new(config, self.settings.clone(), self.installer.clone())
    }
}

#[async_trait]
impl FeatureHandler for ServiceMeshFeatureHandler {
    fn validate_properties(&self, cluster_group: &ClusterGroup, properties: &Value) -> Result<()> {
        MeshConfig::decode(properties)?.validate(cluster_group)
    }

    async fn validate_state(&self, feature: &Feature) -> Result<()> {
        MeshConfig::from_feature(feature)?.validate(&feature.cluster_group)
    }

    async fn reconcile_state(&self, feature: &Feature) -> Result<()> {
        let span = info_span!(
            "servicemesh",
            correlation_id = %generate_id(),
            cluster_group_id = feature.cluster_group.id,
            cluster_group = %feature.cluster_group.name,
        );

        async {
            info!(enabled = feature.enabled, "start reconciling service mesh feature");

            let reconciler = self.reconciler(feature)?;
            if let Err(e) = reconciler.reconcile().await {
                error!(error = %e, "could not reconcile service mesh");
                return Err(e);
            }

            info!("finished reconciling service mesh feature");
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn members_status(&self, feature: &Feature) -> Result<BTreeMap<u32, String>> {
        Ok(self.reconciler(feature)?.members_status().await)
    }
}

/// Time-based id correlating the log lines of one reconciliation
fn generate_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{:016x}", now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::ConstantBackoffConfig;
    use crate::error::Error;
    use crate::features::{FeatureManager, FeatureRegistry, MemoryFeatureRepository};
    use crate::mesh::{FEATURE_NAME, STATUS_READY};
    use crate::testing::{CallLog, FakeCluster, FakeInstaller};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;

    fn group(log: &Arc<CallLog>) -> ClusterGroup {
        ClusterGroup::new(
            3,
            "fleet",
            1,
            FakeCluster::with_log(1, "alpha", log.clone())
                .with_crd("metrics.config.istio.io")
                .into_ref(),
            vec![FakeCluster::with_log(2, "beta", log.clone()).into_ref()],
        )
    }

    fn handler(log: &Arc<CallLog>) -> Arc<ServiceMeshFeatureHandler> {
        let settings = MeshSettings {
            backoff: ConstantBackoffConfig::new(Duration::from_millis(1), 2),
            ..Default::default()
        };
        Arc::new(ServiceMeshFeatureHandler::new(
            Arc::new(settings),
            FakeInstaller::new(log.clone()),
        ))
    }

    #[test]
    fn test_validate_properties() {
        let log = CallLog::new();
        let h = handler(&log);
        let group = group(&log);

        assert!(h.validate_properties(&group, &json!({ "masterClusterID": 2 })).is_ok());
        assert_matches!(
            h.validate_properties(&group, &json!({ "enableMTLS": true })),
            Err(Error::Validation(_))
        );
    }

    #[test]
    fn test_generate_id_is_hex() {
        let id = generate_id();
        assert!(id.len() >= 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_enable_and_disable_through_manager() {
        let log = CallLog::new();
        let group = group(&log);
        let registry = FeatureRegistry::new().with_handler(FEATURE_NAME, handler(&log));
        let repository = Arc::new(MemoryFeatureRepository::new());
        let manager = FeatureManager::new(Arc::new(registry), repository);

        manager
            .enable_feature(FEATURE_NAME, &group, &json!({ "masterClusterID": 1 }))
            .await
            .unwrap();
        manager.reconcile_features(&group, false).await.unwrap();

        let feature = manager.get_feature(&group, FEATURE_NAME).await.unwrap();
        let status = manager.feature_status(&feature).await.unwrap().unwrap();
        assert_eq!(status.len(), 2);
        assert!(status.values().all(|s| s == STATUS_READY));

        manager.disable_feature(FEATURE_NAME, &group).await.unwrap();
        manager.reconcile_features(&group, false).await.unwrap();

        assert_eq!(log.count("install uistio@alpha"), 1);
        assert_eq!(log.count("uninstall uistio@alpha"), 1);
        assert_eq!(log.count("delete RemoteIstio/beta@alpha"), 1);

        let feature = manager.get_feature(&group, FEATURE_NAME).await.unwrap();
        assert!(!feature.enabled);
        assert_eq!(feature.last_reconcile_error, None);
    }
}
