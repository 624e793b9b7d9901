//! Desired-state driver for a single named API object
//!
//! The namespace, control plane, remote and CRD steps all reduce to the same
//! moves: get, then create / update / keep, or delete and optionally wait
//! until the API stops returning the object.

use crate::backoff::{self, ConstantBackoffConfig};
use crate::domain::ports::ResourceClientRef;
use crate::error::{Error, Result};
use std::future::Future;
use tracing::debug;

/// What a pass changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Unchanged,
    Deleted,
    AlreadyAbsent,
}

/// Treatment of an object that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingPolicy {
    /// Leave it as it is
    Keep,
    /// Rebuild it and update when the result differs
    Reconfigure,
}

pub struct ManagedResource<K> {
    client: ResourceClientRef<K>,
    kind: &'static str,
    name: String,
}

impl<K> ManagedResource<K>
where
    K: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(client: ResourceClientRef<K>, kind: &'static str, name: impl Into<String>) -> Self {
        Self {
            client,
            kind,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Converge to present
    ///
    /// `build` receives the current object (if any) and returns the desired
    /// one. It is not called for existing objects under [`ExistingPolicy::Keep`].
    pub async fn ensure_present<F, Fut>(&self, policy: ExistingPolicy, build: F) -> Result<Change>
    where
        F: FnOnce(Option<K>) -> Fut,
        Fut: Future<Output = Result<K>>,
    {
        let change = match self.client.get(&self.name).await? {
            Some(_) if policy == ExistingPolicy::Keep => Change::Unchanged,
            Some(current) => {
                let desired = build(Some(current.clone())).await?;
                if desired == current {
                    Change::Unchanged
                } else {
                    self.client.update(&desired).await?;
                    Change::Updated
                }
            }
            None => {
                let desired = build(None).await?;
                match self.client.create(&desired).await {
                    Ok(_) => Change::Created,
                    // Created by someone else since the get
                    Err(e) if e.is_already_exists() && policy == ExistingPolicy::Keep => {
                        Change::Unchanged
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        debug!(kind = self.kind, name = %self.name, ?change, "resource present");
        Ok(change)
    }

    /// Converge to absent
    ///
    /// With `wait`, deletion is only reported once the object is gone.
    pub async fn ensure_absent(&self, wait: Option<&ConstantBackoffConfig>) -> Result<Change> {
        let change = if self.client.delete(&self.name).await? {
            Change::Deleted
        } else {
            Change::AlreadyAbsent
        };

        if let Some(config) = wait {
            self.wait_until_gone(config).await?;
        }

        debug!(kind = self.kind, name = %self.name, ?change, "resource absent");
        Ok(change)
    }

    async fn wait_until_gone(&self, config: &ConstantBackoffConfig) -> Result<()> {
        debug!(kind = self.kind, name = %self.name, "waiting for resource to be deleted");

        let operation = format!("{}/{} to be deleted", self.kind, self.name);
        backoff::retry(config, &operation, || async {
            match self.client.get(&self.name).await? {
                None => Ok(()),
                Some(_) => Err(Error::ResourceStillExists {
                    kind: self.kind.to_string(),
                    name: self.name.clone(),
                }),
            }
        })
        .await
    }

    /// Wait until the API returns the object
    pub async fn wait_until_present(&self, config: &ConstantBackoffConfig) -> Result<K> {
        debug!(kind = self.kind, name = %self.name, "waiting for resource to be available");

        let operation = format!("{}/{} to be available", self.kind, self.name);
        backoff::retry(config, &operation, || async {
            self.client
                .get(&self.name)
                .await?
                .ok_or_else(|| Error::ResourceNotFound {
                    kind: self.kind.to_string(),
                    name: self.name.clone(),
                })
        })
        .await
    }
}
