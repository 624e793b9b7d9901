//! Control plane resource on the master cluster

use super::reconciler::MeshReconciler;
use super::resource::{Change, ExistingPolicy, ManagedResource};
use super::{
    CLOUD_LABEL, CLUSTER_ID_LABEL, CONTROLLER_TOOLS_LABEL, CONTROLLER_TOOLS_VERSION,
    DISTRIBUTION_LABEL,
};
use crate::crd::{Istio, IstioSpec};
use crate::domain::feature::DesiredState;
use crate::error::Result;
use std::collections::BTreeMap;

impl MeshReconciler {
    pub(crate) async fn reconcile_istio(&self, desired: DesiredState) -> Result<Change> {
        let client = self.master.istios(&self.settings.namespace).await?;
        let istio = ManagedResource::new(client, "Istio", &self.config.name);

        match desired {
            DesiredState::Present => {
                let include_ip_ranges = if self.config.bypass_egress_traffic {
                    Some(self.master.ipv4_cidrs().await?.include_ip_ranges())
                } else {
                    None
                };

                istio
                    .ensure_present(ExistingPolicy::Reconfigure, |existing| async move {
                        let base = existing.unwrap_or_else(|| self.new_istio());
                        Ok(self.configure_istio(base, include_ip_ranges))
                    })
                    .await
            }
            DesiredState::Absent => istio.ensure_absent(Some(&self.settings.backoff)).await,
        }
    }

    fn new_istio(&self) -> Istio {
        let mut istio = Istio::new(&self.config.name, IstioSpec::default());
        istio.metadata.namespace = Some(self.settings.namespace.clone());
        istio
    }

    /// Apply the desired configuration on top of `istio`
    ///
    /// Fields not managed here are carried over untouched.
    pub(crate) fn configure_istio(&self, mut istio: Istio, include_ip_ranges: Option<String>) -> Istio {
        let labels = istio.metadata.labels.get_or_insert_with(BTreeMap::new);
        labels.insert(
            CONTROLLER_TOOLS_LABEL.to_string(),
            CONTROLLER_TOOLS_VERSION.to_string(),
        );
        labels.insert(CLUSTER_ID_LABEL.to_string(), self.master.id().to_string());
        labels.insert(CLOUD_LABEL.to_string(), self.master.cloud().to_string());
        labels.insert(
            DISTRIBUTION_LABEL.to_string(),
            self.master.distribution().to_string(),
        );

        let spec = &mut istio.spec;
        spec.version = self.settings.istio_version.clone();
        spec.mtls = self.config.enable_mtls;
        spec.auto_injection_namespaces = self.config.auto_sidecar_inject_namespaces.clone();
        spec.gateways.ingress_config.max_replicas = Some(1);
        spec.gateways.egress_config.max_replicas = Some(1);
        spec.pilot.image = Some(self.settings.pilot_image.clone());
        spec.pilot.max_replicas = Some(1);
        spec.mixer.image = Some(self.settings.mixer_image.clone());
        spec.mixer.max_replicas = Some(1);

        // Federation needs MCP and mutual TLS, whatever the user asked for
        if !self.remotes.is_empty() {
            spec.use_mcp = true;
            spec.mtls = true;
            spec.mesh_expansion = Some(true);
            spec.control_plane_security_enabled = true;
        }

        spec.include_ip_ranges = include_ip_ranges;
        istio
    }
}
