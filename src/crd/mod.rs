//! Custom Resource Definitions reconciled by the operator
//!
//! This module contains the service mesh CRD types:
//! - Istio: mesh control plane on the master cluster
//! - RemoteIstio: one per remote cluster joining the mesh

pub mod istio;

pub use istio::*;
