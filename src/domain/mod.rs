//! Domain layer - Core types and port definitions
//!
//! This module defines the cluster group and feature types the engine
//! operates on, and the traits (ports) that adapters implement,
//! following hexagonal architecture principles.

pub mod cluster;
pub mod feature;
pub mod ports;

pub use cluster::*;
pub use feature::*;
pub use ports::*;
