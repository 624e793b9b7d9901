//! Service mesh configuration
//!
//! [`MeshConfig`] is decoded from the feature's stored properties.
//! [`MeshSettings`] is process-wide operator configuration.

use crate::backoff::ConstantBackoffConfig;
use crate::domain::cluster::ClusterGroup;
use crate::domain::feature::Feature;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Feature Properties
// =============================================================================

/// Decoded properties of the servicemesh feature
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshConfig {
    /// Cluster hosting the mesh control plane
    #[serde(rename = "masterClusterID", default)]
    pub master_cluster_id: u32,

    #[serde(rename = "enableMTLS", default)]
    pub enable_mtls: bool,

    #[serde(default)]
    pub auto_sidecar_inject_namespaces: Vec<String>,

    /// Keep egress traffic out of the mesh by intercepting cluster ranges only
    #[serde(default)]
    pub bypass_egress_traffic: bool,

    /// Cluster group name, also the name of the control plane resource
    #[serde(skip)]
    pub name: String,

    #[serde(skip)]
    pub enabled: bool,

    #[serde(skip)]
    pub cluster_group: Option<ClusterGroup>,
}

impl MeshConfig {
    /// Decode properties without binding them to a feature
    pub fn decode(properties: &Value) -> Result<Self> {
        serde_json::from_value(properties.clone())
            .map_err(|e| Error::Validation(format!("could not decode service mesh properties: {}", e)))
    }

    /// Decode a feature's properties and attach the group it belongs to
    pub fn from_feature(feature: &Feature) -> Result<Self> {
        let mut config = Self::decode(&feature.properties)?;
        config.name = feature.cluster_group.name.clone();
        config.enabled = feature.enabled;
        config.cluster_group = Some(feature.cluster_group.clone());
        Ok(config)
    }

    pub fn validate(&self, cluster_group: &ClusterGroup) -> Result<()> {
        if self.master_cluster_id == 0 {
            return Err(Error::Validation("master cluster ID is required".into()));
        }

        if cluster_group.cluster(self.master_cluster_id).is_none() {
            return Err(Error::Validation(format!(
                "master cluster {} is not part of cluster group {}",
                self.master_cluster_id, cluster_group.name
            )));
        }

        Ok(())
    }
}

// =============================================================================
// Operator Settings
// =============================================================================

/// Companion dashboard release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionSettings {
    pub namespace: String,
    pub chart: String,
    pub release_name: String,
    /// Latest when empty
    pub chart_version: String,
}

impl Default for CompanionSettings {
    fn default() -> Self {
        Self {
            namespace: "istio-system".to_string(),
            chart: "banzaicloud-stable/uistio".to_string(),
            release_name: "uistio".to_string(),
            chart_version: String::new(),
        }
    }
}

/// Operator-wide settings of the service mesh feature
#[derive(Debug, Clone)]
pub struct MeshSettings {
    /// Namespace holding the mesh resources on the master
    pub namespace: String,
    pub istio_version: String,
    pub pilot_image: String,
    pub mixer_image: String,
    pub uistio: CompanionSettings,
    /// CRD that must exist before the companion is installed
    pub metrics_crd: String,
    /// Used for deletion and CRD availability waits
    pub backoff: ConstantBackoffConfig,
    /// Remote clusters reconciled at the same time
    pub remote_concurrency: usize,
    /// Also confirm remote resource deletion
    pub wait_for_remote_deletion: bool,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            namespace: "istio-system".to_string(),
            istio_version: "1.1".to_string(),
            pilot_image: "docker.io/istio/pilot:1.1.0".to_string(),
            mixer_image: "docker.io/istio/mixer:1.1.0".to_string(),
            uistio: CompanionSettings::default(),
            metrics_crd: "metrics.config.istio.io".to_string(),
            backoff: ConstantBackoffConfig::default(),
            remote_concurrency: 1,
            wait_for_remote_deletion: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn group() -> ClusterGroup {
        ClusterGroup::new(
            1,
            "mesh",
            1,
            FakeCluster::new(7, "master").into_ref(),
            vec![FakeCluster::new(8, "member").into_ref()],
        )
    }

    #[test]
    fn test_decode_properties() {
        let config = MeshConfig::decode(&json!({
            "masterClusterID": 7,
            "enableMTLS": true,
            "autoSidecarInjectNamespaces": ["default", "apps"],
            "bypassEgressTraffic": true
        }))
        .unwrap();

        assert_eq!(config.master_cluster_id, 7);
        assert!(config.enable_mtls);
        assert_eq!(config.auto_sidecar_inject_namespaces, vec!["default", "apps"]);
        assert!(config.bypass_egress_traffic);
        assert!(config.cluster_group.is_none());
    }

    #[test]
    fn test_missing_master_is_invalid() {
        let config = MeshConfig::decode(&json!({ "enableMTLS": true })).unwrap();
        assert_matches!(
            config.validate(&group()),
            Err(Error::Validation(ref msg)) if msg == "master cluster ID is required"
        );
    }

    #[test]
    fn test_master_must_belong_to_group() {
        let config = MeshConfig::decode(&json!({ "masterClusterID": 42 })).unwrap();
        assert_matches!(config.validate(&group()), Err(Error::Validation(_)));

        let config = MeshConfig::decode(&json!({ "masterClusterID": 8 })).unwrap();
        assert!(config.validate(&group()).is_ok());
    }

    #[test]
    fn test_decode_failure_is_validation_error() {
        assert_matches!(
            MeshConfig::decode(&json!({ "masterClusterID": "seven" })),
            Err(Error::Validation(_))
        );
        assert_matches!(MeshConfig::decode(&Value::Null), Err(Error::Validation(_)));
    }

    #[test]
    fn test_from_feature_attaches_group() {
        let feature = Feature {
            cluster_group: group(),
            name: "servicemesh".into(),
            enabled: true,
            properties: json!({ "masterClusterID": 7 }),
            last_reconcile_error: None,
        };

        let config = MeshConfig::from_feature(&feature).unwrap();
        assert_eq!(config.name, "mesh");
        assert!(config.enabled);
        assert_eq!(config.cluster_group.map(|g| g.id), Some(1));
    }
}
