//! Istio operator CRDs
//!
//! Only the fields the mesh reconciler sets are typed. Everything else in a
//! spec is kept in the `extra` maps, so replacing a fetched object writes
//! back what other writers put there. `Istio` describes the mesh control
//! plane on the master cluster; `RemoteIstio` describes the part of the mesh
//! running on a remote cluster and lives next to the control plane on the
//! master.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// Istio CRD
// =============================================================================

/// Mesh control plane definition
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "istio.banzaicloud.io",
    version = "v1beta1",
    kind = "Istio",
    plural = "istios",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct IstioSpec {
    /// Istio release the operator should run
    #[serde(default)]
    pub version: String,

    /// Mutual TLS between sidecars
    #[serde(default, rename = "mtls")]
    pub mtls: bool,

    /// Namespaces labelled for automatic sidecar injection
    #[serde(default)]
    pub auto_injection_namespaces: Vec<String>,

    /// Outbound ranges intercepted by the sidecar
    #[serde(
        default,
        rename = "includeIPRanges",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_ip_ranges: Option<String>,

    /// Mesh configuration protocol between control plane components
    #[serde(default, rename = "useMCP")]
    pub use_mcp: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_expansion: Option<bool>,

    #[serde(default)]
    pub control_plane_security_enabled: bool,

    #[serde(default)]
    pub pilot: ComponentConfiguration,

    #[serde(default)]
    pub mixer: ComponentConfiguration,

    #[serde(default)]
    pub gateways: GatewaysConfiguration,

    /// Fields not managed by this operator
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Image and scaling of a control plane component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewaysConfiguration {
    #[serde(default, rename = "ingress")]
    pub ingress_config: GatewayConfiguration,

    #[serde(default, rename = "egress")]
    pub egress_config: GatewayConfiguration,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// =============================================================================
// RemoteIstio CRD
// =============================================================================

/// Remote cluster participating in a federated mesh
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "istio.banzaicloud.io",
    version = "v1beta1",
    kind = "RemoteIstio",
    plural = "remoteistios",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIstioSpec {
    #[serde(default)]
    pub auto_injection_namespaces: Vec<String>,

    #[serde(
        default,
        rename = "includeIPRanges",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_ip_ranges: Option<String>,

    /// Control plane services made reachable from the remote cluster
    #[serde(default)]
    pub enabled_services: Vec<IstioService>,

    #[serde(default)]
    pub citadel: ToggleConfiguration,

    #[serde(default)]
    pub sidecar_injector: ToggleConfiguration,

    /// Fields not managed by this operator
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Service exposed from the control plane to a remote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IstioService {
    pub name: String,

    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub port: i32,

    #[serde(default = "default_protocol")]
    pub protocol: String,
}

/// Optional component switch with replica count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_count: Option<i32>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_protocol() -> String {
    "TCP".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_names() {
        let crd = Istio::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("istios.istio.banzaicloud.io"));
        assert_eq!(crd.spec.scope, "Namespaced");

        let crd = RemoteIstio::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("remoteistios.istio.banzaicloud.io")
        );
    }

    #[test]
    fn test_istio_spec_field_names() {
        let spec = IstioSpec {
            mtls: true,
            use_mcp: true,
            include_ip_ranges: Some("10.0.0.0/16".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).unwrap();

        assert_eq!(json["mtls"], true);
        assert_eq!(json["useMCP"], true);
        assert_eq!(json["includeIPRanges"], "10.0.0.0/16");
        assert!(json.get("meshExpansion").is_none());
    }

    #[test]
    fn test_unmanaged_fields_survive_round_trip() {
        let server = serde_json::json!({
            "apiVersion": "istio.banzaicloud.io/v1beta1",
            "kind": "Istio",
            "metadata": { "name": "mesh", "namespace": "istio-system" },
            "spec": {
                "version": "1.1",
                "mtls": true,
                "pilot": { "image": "p", "maxReplicas": 1, "minReplicas": 2 },
                "gateways": { "ingress": { "maxReplicas": 1, "serviceType": "NodePort" } },
                "sidecarInjector": { "enabled": true },
                "tracing": { "enabled": false }
            }
        });

        let mut istio: Istio = serde_json::from_value(server).unwrap();
        assert_eq!(istio.spec.pilot.max_replicas, Some(1));
        assert_eq!(istio.spec.extra["tracing"]["enabled"], false);

        istio.spec.pilot.image = Some("q".into());
        let json = serde_json::to_value(&istio).unwrap();

        assert_eq!(json["spec"]["pilot"]["image"], "q");
        assert_eq!(json["spec"]["pilot"]["minReplicas"], 2);
        assert_eq!(json["spec"]["gateways"]["ingress"]["serviceType"], "NodePort");
        assert_eq!(json["spec"]["sidecarInjector"]["enabled"], true);
        assert_eq!(json["spec"]["tracing"]["enabled"], false);
    }

    #[test]
    fn test_remote_istio_keeps_unmanaged_fields() {
        let server = serde_json::json!({
            "apiVersion": "istio.banzaicloud.io/v1beta1",
            "kind": "RemoteIstio",
            "metadata": { "name": "beta", "namespace": "istio-system" },
            "spec": {
                "citadel": { "enabled": true, "image": "citadel:1.1" },
                "proxy": { "image": "proxyv2:1.1" }
            }
        });

        let remote: RemoteIstio = serde_json::from_value(server).unwrap();
        let json = serde_json::to_value(&remote).unwrap();

        assert_eq!(json["spec"]["citadel"]["image"], "citadel:1.1");
        assert_eq!(json["spec"]["proxy"]["image"], "proxyv2:1.1");
    }
}
