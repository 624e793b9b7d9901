//! Feature types
//!
//! A feature is an optional capability enabled per cluster group. The
//! engine keeps its properties as a schemaless JSON value; each handler
//! decodes them into its own configuration type.

use crate::domain::cluster::ClusterGroup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// Desired State
// =============================================================================

/// Binary target every sub-reconciler converges toward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Present,
    Absent,
}

impl From<bool> for DesiredState {
    fn from(enabled: bool) -> Self {
        if enabled {
            DesiredState::Present
        } else {
            DesiredState::Absent
        }
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesiredState::Present => write!(f, "present"),
            DesiredState::Absent => write!(f, "absent"),
        }
    }
}

// =============================================================================
// Feature
// =============================================================================

/// A feature of a cluster group as seen by handlers
#[derive(Debug, Clone)]
pub struct Feature {
    pub cluster_group: ClusterGroup,
    pub name: String,
    pub enabled: bool,
    pub properties: Value,
    pub last_reconcile_error: Option<String>,
}

impl Feature {
    pub fn desired_state(&self) -> DesiredState {
        self.enabled.into()
    }
}

/// Persisted form of a feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRecord {
    pub cluster_group_id: u32,
    pub name: String,
    pub enabled: bool,
    /// Raw JSON document of the handler specific properties
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default)]
    pub last_reconcile_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureRecord {
    pub fn new(cluster_group_id: u32, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            cluster_group_id,
            name: name.into(),
            enabled: false,
            properties: None,
            last_reconcile_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Feature details returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureResponse {
    pub name: String,
    pub cluster_group_id: u32,
    pub cluster_group_name: String,
    pub enabled: bool,
    pub properties: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconcile_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BTreeMap<u32, String>>,
}

impl FeatureResponse {
    pub fn new(feature: &Feature, status: Option<BTreeMap<u32, String>>) -> Self {
        Self {
            name: feature.name.clone(),
            cluster_group_id: feature.cluster_group.id,
            cluster_group_name: feature.cluster_group.name.clone(),
            enabled: feature.enabled,
            properties: feature.properties.clone(),
            last_reconcile_error: feature.last_reconcile_error.clone(),
            status,
        }
    }
}
