//! Cluster Group Operator
//!
//! Command line front end of the feature reconciliation engine. The cluster
//! group is described in a YAML file and feature state is kept in a JSON
//! file, so every subcommand is a single pass over the group.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cluster_group_operator::mesh::{CompanionSettings, FEATURE_NAME};
use cluster_group_operator::{
    ClusterGroupDescriptor, ConstantBackoffConfig, Error, FeatureManager, FeatureRegistry,
    FileFeatureRepository, HelmInstaller, MeshSettings, Result, ServiceMeshFeatureHandler,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Cluster Group Operator - feature reconciliation for groups of Kubernetes clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cluster group description (YAML)
    #[arg(long, env = "CLUSTER_GROUP_FILE")]
    cluster_group: PathBuf,

    /// Feature state file (JSON)
    #[arg(long, env = "FEATURE_STATE_FILE", default_value = "features.json")]
    state_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(flatten)]
    mesh: MeshArgs,

    /// Helm binary used for companion deployments
    #[arg(long, env = "HELM_BIN", default_value = "helm")]
    helm_bin: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct MeshArgs {
    /// Namespace of the mesh resources on the master cluster
    #[arg(long, env = "MESH_NAMESPACE", default_value = "istio-system")]
    mesh_namespace: String,

    #[arg(long, env = "ISTIO_VERSION", default_value = "1.1")]
    istio_version: String,

    #[arg(long, env = "PILOT_IMAGE", default_value = "docker.io/istio/pilot:1.1.0")]
    pilot_image: String,

    #[arg(long, env = "MIXER_IMAGE", default_value = "docker.io/istio/mixer:1.1.0")]
    mixer_image: String,

    #[arg(long, env = "UISTIO_CHART", default_value = "banzaicloud-stable/uistio")]
    uistio_chart: String,

    /// Latest when empty
    #[arg(long, env = "UISTIO_CHART_VERSION", default_value = "")]
    uistio_chart_version: String,

    /// Delay between polls of bounded waits
    #[arg(long, env = "BACKOFF_DELAY_SECS", default_value = "5")]
    backoff_delay_secs: u64,

    #[arg(long, env = "BACKOFF_MAX_RETRIES", default_value = "24")]
    backoff_max_retries: u32,

    /// Remote clusters reconciled at the same time
    #[arg(long, env = "REMOTE_CONCURRENCY", default_value = "1")]
    remote_concurrency: usize,

    /// Wait for remote resources to disappear on disable
    #[arg(long, env = "WAIT_FOR_REMOTE_DELETION")]
    wait_for_remote_deletion: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enable a feature and reconcile the group
    Enable {
        feature: String,
        /// Properties as JSON, or @path to a JSON file
        #[arg(long, default_value = "{}")]
        properties: String,
    },

    /// Replace the properties of a feature and reconcile the group
    Update {
        feature: String,
        /// Properties as JSON, or @path to a JSON file
        #[arg(long, default_value = "{}")]
        properties: String,
    },

    /// Disable a feature and reconcile the group
    Disable { feature: String },

    /// Show a feature with its member status
    Get { feature: String },

    /// List the features of the group
    List,

    /// Reconcile the features of the group
    Reconcile {
        #[arg(long)]
        only_enabled: bool,
    },

    /// Disable and tear down every enabled feature
    DisableAll,
}

impl MeshArgs {
    fn settings(&self) -> MeshSettings {
        MeshSettings {
            namespace: self.mesh_namespace.clone(),
            istio_version: self.istio_version.clone(),
            pilot_image: self.pilot_image.clone(),
            mixer_image: self.mixer_image.clone(),
            uistio: CompanionSettings {
                namespace: self.mesh_namespace.clone(),
                chart: self.uistio_chart.clone(),
                chart_version: self.uistio_chart_version.clone(),
                ..Default::default()
            },
            backoff: ConstantBackoffConfig::new(
                Duration::from_secs(self.backoff_delay_secs),
                self.backoff_max_retries,
            ),
            remote_concurrency: self.remote_concurrency,
            wait_for_remote_deletion: self.wait_for_remote_deletion,
            ..Default::default()
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!(
        version = cluster_group_operator::VERSION,
        cluster_group = %args.cluster_group.display(),
        state_file = %args.state_file.display(),
        "Starting Cluster Group Operator"
    );

    let descriptor = ClusterGroupDescriptor::load(&args.cluster_group).await?;
    let cluster_group = descriptor.connect().await?;

    let installer = Arc::new(HelmInstaller::new(&args.helm_bin));
    let mesh = ServiceMeshFeatureHandler::new(Arc::new(args.mesh.settings()), installer);
    let registry = FeatureRegistry::new().with_handler(FEATURE_NAME, Arc::new(mesh));
    let repository = Arc::new(FileFeatureRepository::new(&args.state_file));
    let manager = FeatureManager::new(Arc::new(registry), repository);

    match &args.command {
        Command::Enable {
            feature,
            properties,
        } => {
            let properties = read_properties(properties).await?;
            manager
                .enable_feature(feature, &cluster_group, &properties)
                .await?;
            manager.reconcile_features(&cluster_group, false).await?;
        }
        Command::Update {
            feature,
            properties,
        } => {
            let properties = read_properties(properties).await?;
            manager
                .update_feature(feature, &cluster_group, &properties)
                .await?;
            manager.reconcile_features(&cluster_group, false).await?;
        }
        Command::Disable { feature } => {
            manager.disable_feature(feature, &cluster_group).await?;
            manager.reconcile_features(&cluster_group, false).await?;
        }
        Command::Get { feature } => {
            let response = manager.describe_feature(&cluster_group, feature).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::List => {
            let features = manager.get_features(&cluster_group).await?;
            let listing: Vec<Value> = features
                .values()
                .map(|f| {
                    serde_json::json!({
                        "name": f.name,
                        "enabled": f.enabled,
                        "lastReconcileError": f.last_reconcile_error,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::Reconcile { only_enabled } => {
            manager
                .reconcile_features(&cluster_group, *only_enabled)
                .await?;
        }
        Command::DisableAll => {
            manager.disable_features(&cluster_group).await?;
        }
    }

    info!("Done");
    Ok(())
}

/// Inline JSON, or `@path` to read it from a file
async fn read_properties(raw: &str) -> Result<Value> {
    let contents = match raw.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => raw.to_string(),
    };
    serde_json::from_str(&contents)
        .map_err(|e| Error::Validation(format!("properties are not valid JSON: {}", e)))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let directive = |d: &str| {
        d.parse::<Directive>()
            .map_err(|e| Error::Configuration(format!("Invalid log directive {}: {}", d, e)))
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("kube=info")?)
        .add_directive(directive("tower=warn")?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}
