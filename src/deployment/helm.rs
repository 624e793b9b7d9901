//! Helm CLI adapter for the deployment installer port

use crate::domain::ports::{Cluster, DeploymentInstaller, DeploymentRequest};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

pub const DEFAULT_HELM_BIN: &str = "helm";
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs `helm upgrade --install` and `helm uninstall` against a cluster's
/// kubeconfig and context
#[derive(Debug, Clone)]
pub struct HelmInstaller {
    program: PathBuf,
    leading_args: Vec<String>,
    wait_timeout: Duration,
}

impl Default for HelmInstaller {
    fn default() -> Self {
        Self::new(DEFAULT_HELM_BIN)
    }
}

impl HelmInstaller {
    pub fn new(helm_bin: impl Into<PathBuf>) -> Self {
        Self {
            program: helm_bin.into(),
            leading_args: Vec::new(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Run a shell script in place of the helm binary
    #[cfg(test)]
    fn scripted(script: &std::path::Path) -> Self {
        Self {
            program: PathBuf::from("sh"),
            leading_args: vec![script.display().to_string()],
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    fn install_args(&self, cluster: &dyn Cluster, request: &DeploymentRequest) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            request.release_name.clone(),
            request.chart.clone(),
            "--namespace".to_string(),
            request.namespace.clone(),
            "--create-namespace".to_string(),
        ];

        if !request.version.is_empty() {
            args.push("--version".to_string());
            args.push(request.version.clone());
        }

        if !request.values.is_empty() {
            args.push("--values".to_string());
            args.push("-".to_string());
        }

        if request.wait {
            args.push("--wait".to_string());
            args.push("--timeout".to_string());
            args.push(format!("{}s", self.wait_timeout.as_secs()));
        }

        args.extend(cluster_args(cluster));
        args
    }

    fn uninstall_args(cluster: &dyn Cluster, namespace: &str, release_name: &str) -> Vec<String> {
        let mut args = vec![
            "uninstall".to_string(),
            release_name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        args.extend(cluster_args(cluster));
        args
    }

    async fn run(&self, args: &[String], stdin: Option<&[u8]>) -> Result<std::process::Output> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
        }

        Ok(child.wait_with_output().await?)
    }
}

fn cluster_args(cluster: &dyn Cluster) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(path) = cluster.kubeconfig_path() {
        args.push("--kubeconfig".to_string());
        args.push(path.display().to_string());
    }
    if let Some(context) = cluster.kube_context() {
        args.push("--kube-context".to_string());
        args.push(context.to_string());
    }
    args
}

/// Helm reports a missing release as `release: not found`; other "not found"
/// messages (kube context, kubeconfig) are real failures.
fn release_missing(stderr: &str) -> bool {
    stderr.contains("release: not found")
}

fn failure(release: &str, output: &std::process::Output) -> Error {
    Error::Deployment {
        release: release.to_string(),
        reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

#[async_trait]
impl DeploymentInstaller for HelmInstaller {
    async fn install_deployment(
        &self,
        cluster: &dyn Cluster,
        request: &DeploymentRequest,
    ) -> Result<()> {
        info!(
            cluster = %cluster.name(),
            release = %request.release_name,
            chart = %request.chart,
            "installing deployment"
        );

        let args = self.install_args(cluster, request);
        let values = (!request.values.is_empty()).then_some(request.values.as_slice());
        let output = self.run(&args, values).await?;

        if !output.status.success() {
            return Err(failure(&request.release_name, &output));
        }

        debug!(release = %request.release_name, "deployment installed");
        Ok(())
    }

    async fn delete_deployment(
        &self,
        cluster: &dyn Cluster,
        namespace: &str,
        release_name: &str,
    ) -> Result<()> {
        info!(cluster = %cluster.name(), release = %release_name, "deleting deployment");

        let args = Self::uninstall_args(cluster, namespace, release_name);
        let output = self.run(&args, None).await?;

        if output.status.success() {
            return Ok(());
        }

        if release_missing(&String::from_utf8_lossy(&output.stderr)) {
            debug!(release = %release_name, "deployment already deleted");
            return Ok(());
        }

        Err(failure(release_name, &output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn request(values: &[u8]) -> DeploymentRequest {
        DeploymentRequest {
            namespace: "istio-system".into(),
            chart: "banzaicloud-stable/uistio".into(),
            release_name: "uistio".into(),
            values: values.to_vec(),
            version: String::new(),
            wait: true,
        }
    }

    #[test]
    fn test_install_args() {
        let cluster = FakeCluster::new(1, "alpha");
        let helm = HelmInstaller::default().with_wait_timeout(Duration::from_secs(60));

        let args = helm.install_args(&cluster, &request(b""));
        assert_eq!(
            args,
            vec![
                "upgrade",
                "--install",
                "uistio",
                "banzaicloud-stable/uistio",
                "--namespace",
                "istio-system",
                "--create-namespace",
                "--wait",
                "--timeout",
                "60s",
            ]
        );

        let mut versioned = request(b"replicas: 2\n");
        versioned.version = "0.0.9".into();
        versioned.wait = false;
        let args = helm.install_args(&cluster, &versioned);
        assert!(args.windows(2).any(|w| w == ["--version", "0.0.9"]));
        assert!(args.windows(2).any(|w| w == ["--values", "-"]));
        assert!(!args.contains(&"--wait".to_string()));
    }

    /// Script recording its arguments and stdin, then exiting as told
    fn script(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("helm.sh");
        let log = dir.path().join("calls.log");
        std::fs::write(
            &path,
            format!(
                "echo \"$@\" >> {log}\ncat >> {log}\n{body}\n",
                log = log.display(),
                body = body
            ),
        )
        .unwrap();
        path
    }

    fn calls(dir: &TempDir) -> String {
        std::fs::read_to_string(dir.path().join("calls.log")).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_install_passes_values_on_stdin() {
        let dir = TempDir::new().unwrap();
        let helm = HelmInstaller::scripted(&script(&dir, "exit 0"));
        let cluster = FakeCluster::new(1, "alpha");

        helm.install_deployment(&cluster, &request(b"replicas: 2\n"))
            .await
            .unwrap();

        let log = calls(&dir);
        assert!(log.contains("upgrade --install uistio banzaicloud-stable/uistio"));
        assert!(log.contains("replicas: 2"));
    }

    #[tokio::test]
    async fn test_install_failure() {
        let dir = TempDir::new().unwrap();
        let helm = HelmInstaller::scripted(&script(&dir, "echo 'chart not reachable' >&2; exit 1"));
        let cluster = FakeCluster::new(1, "alpha");

        let err = helm
            .install_deployment(&cluster, &request(b""))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Deployment { ref release, ref reason }
            if release == "uistio" && reason == "chart not reachable");
    }

    #[tokio::test]
    async fn test_uninstall_missing_release_succeeds() {
        let dir = TempDir::new().unwrap();
        let helm = HelmInstaller::scripted(&script(
            &dir,
            "echo 'Error: uninstall: Release not loaded: uistio: release: not found' >&2; exit 1",
        ));
        let cluster = FakeCluster::new(1, "alpha");

        helm.delete_deployment(&cluster, "istio-system", "uistio")
            .await
            .unwrap();
        assert!(calls(&dir).contains("uninstall uistio --namespace istio-system"));
    }

    #[tokio::test]
    async fn test_uninstall_unreachable_cluster_fails() {
        let dir = TempDir::new().unwrap();
        let helm = HelmInstaller::scripted(&script(
            &dir,
            "echo 'Error: Kubernetes cluster unreachable: context \"alpha-admin\" not found' >&2; exit 1",
        ));
        let cluster = FakeCluster::new(1, "alpha");

        let err = helm
            .delete_deployment(&cluster, "istio-system", "uistio")
            .await
            .unwrap_err();
        assert_matches!(err, Error::Deployment { ref reason, .. } if reason.contains("alpha-admin"));
    }

    #[tokio::test]
    async fn test_uninstall_failure() {
        let dir = TempDir::new().unwrap();
        let helm = HelmInstaller::scripted(&script(&dir, "echo 'cluster unreachable' >&2; exit 1"));
        let cluster = FakeCluster::new(1, "alpha");

        assert_matches!(
            helm.delete_deployment(&cluster, "istio-system", "uistio").await,
            Err(Error::Deployment { .. })
        );
    }
}
