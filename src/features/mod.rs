//! Cluster group features
//!
//! Registry of feature handlers, the feature manager driving their
//! lifecycle, and feature record repositories.

pub mod manager;
pub mod registry;
pub mod repository;

pub use manager::*;
pub use registry::*;
pub use repository::*;
