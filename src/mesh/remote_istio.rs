//! Remote cluster registrations, stored on the master

use super::reconciler::MeshReconciler;
use super::resource::{Change, ExistingPolicy, ManagedResource};
use super::{ENABLED_SERVICES, REMOTE_SERVICE_PORT};
use crate::crd::{IstioService, RemoteIstio, RemoteIstioSpec, ServicePort, ToggleConfiguration};
use crate::domain::feature::DesiredState;
use crate::domain::ports::ClusterRef;
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

impl MeshReconciler {
    /// Reconcile one RemoteIstio per remote cluster
    ///
    /// Every remote is attempted; the first failure (in remote order) is
    /// returned afterwards.
    pub(crate) async fn reconcile_remote_istios(&self, desired: DesiredState) -> Result<()> {
        let concurrency = self.settings.remote_concurrency.max(1);

        // Boxed before buffering, otherwise the stream is not Send inside async_trait
        let mut pending: Vec<BoxFuture<'_, (ClusterRef, Result<Change>)>> =
            Vec::with_capacity(self.remotes.len());
        for remote in self.remotes.iter().cloned() {
            pending.push(Box::pin(async move {
                let result = self.reconcile_remote_istio(desired, &remote).await;
                (remote, result)
            }));
        }

        let results: Vec<(ClusterRef, Result<Change>)> =
            stream::iter(pending).buffered(concurrency).collect().await;

        let mut first_error: Option<Error> = None;
        for (remote, result) in results {
            match result {
                Ok(change) => debug!(cluster = %remote.name(), ?change, "remote istio reconciled"),
                Err(e) => {
                    warn!(cluster = %remote.name(), error = %e, "could not reconcile remote istio");
                    if first_error.is_none() {
                        first_error = Some(e.in_step(super::STEP_REMOTE_ISTIO, remote.name()));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn reconcile_remote_istio(&self, desired: DesiredState, remote: &ClusterRef) -> Result<Change> {
        let client = self.master.remote_istios(&self.settings.namespace).await?;
        let resource = ManagedResource::new(client, "RemoteIstio", remote.name());

        match desired {
            DesiredState::Present => {
                resource
                    .ensure_present(ExistingPolicy::Keep, |_| async move {
                        let include_ip_ranges = if self.config.bypass_egress_traffic {
                            Some(remote.ipv4_cidrs().await?.include_ip_ranges())
                        } else {
                            None
                        };
                        Ok(self.generate_remote_istio(remote.name(), include_ip_ranges))
                    })
                    .await
            }
            DesiredState::Absent => {
                let wait = self
                    .settings
                    .wait_for_remote_deletion
                    .then_some(&self.settings.backoff);
                resource.ensure_absent(wait).await
            }
        }
    }

    pub(crate) fn generate_remote_istio(&self, name: &str, include_ip_ranges: Option<String>) -> RemoteIstio {
        let enabled_services = ENABLED_SERVICES
            .iter()
            .map(|service| IstioService {
                name: service.to_string(),
                ports: vec![ServicePort {
                    port: REMOTE_SERVICE_PORT,
                    protocol: "TCP".to_string(),
                }],
            })
            .collect();

        let spec = RemoteIstioSpec {
            auto_injection_namespaces: self.config.auto_sidecar_inject_namespaces.clone(),
            include_ip_ranges,
            enabled_services,
            citadel: ToggleConfiguration {
                enabled: Some(true),
                ..Default::default()
            },
            sidecar_injector: ToggleConfiguration {
                enabled: Some(true),
                replica_count: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut remote_istio = RemoteIstio::new(name, spec);
        remote_istio.metadata.namespace = Some(self.settings.namespace.clone());
        remote_istio.metadata.labels = Some(
            [(
                super::CONTROLLER_TOOLS_LABEL.to_string(),
                super::CONTROLLER_TOOLS_VERSION.to_string(),
            )]
            .into(),
        );
        remote_istio
    }
}
