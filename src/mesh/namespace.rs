use super::reconciler::MeshReconciler;
use super::resource::{Change, ExistingPolicy, ManagedResource};
use crate::domain::feature::DesiredState;
use crate::error::Result;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;

impl MeshReconciler {
    /// Mesh namespace on the master cluster
    pub(crate) async fn reconcile_namespace(&self, desired: DesiredState) -> Result<Change> {
        let client = self.master.namespaces().await?;
        let namespace = ManagedResource::new(client, "Namespace", &self.settings.namespace);

        match desired {
            DesiredState::Present => {
                let name = self.settings.namespace.clone();
                namespace
                    .ensure_present(ExistingPolicy::Keep, |_| async move {
                        Ok(Namespace {
                            metadata: ObjectMeta {
                                name: Some(name),
                                ..Default::default()
                            },
                            ..Default::default()
                        })
                    })
                    .await
            }
            DesiredState::Absent => namespace.ensure_absent(None).await,
        }
    }
}
