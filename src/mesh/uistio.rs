//! Companion dashboard release on the master cluster

use super::reconciler::MeshReconciler;
use super::resource::ManagedResource;
use crate::domain::feature::DesiredState;
use crate::domain::ports::DeploymentRequest;
use crate::error::Result;
use tracing::debug;

impl MeshReconciler {
    pub(crate) async fn reconcile_uistio(&self, desired: DesiredState) -> Result<()> {
        let companion = &self.settings.uistio;

        match desired {
            DesiredState::Present => {
                // The chart ships resources of this kind; installing earlier fails
                self.wait_for_metrics_crd().await?;

                let request = DeploymentRequest {
                    namespace: companion.namespace.clone(),
                    chart: companion.chart.clone(),
                    release_name: companion.release_name.clone(),
                    values: Vec::new(),
                    version: companion.chart_version.clone(),
                    wait: true,
                };
                self.installer
                    .install_deployment(self.master.as_ref(), &request)
                    .await
            }
            DesiredState::Absent => {
                self.installer
                    .delete_deployment(
                        self.master.as_ref(),
                        &companion.namespace,
                        &companion.release_name,
                    )
                    .await
            }
        }
    }

    async fn wait_for_metrics_crd(&self) -> Result<()> {
        let client = self.master.custom_resource_definitions().await?;
        ManagedResource::new(client, "CustomResourceDefinition", &self.settings.metrics_crd)
            .wait_until_present(&self.settings.backoff)
            .await?;

        debug!(crd = %self.settings.metrics_crd, "metrics CRD available");
        Ok(())
    }
}
