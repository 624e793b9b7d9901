//! Deployment installer adapters

pub mod helm;

pub use helm::{HelmInstaller, DEFAULT_HELM_BIN};
