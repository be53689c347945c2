//! `docker` CLI backed [`ContainerRuntime`]

use crate::error::{Result, SyncError};
use crate::image::{DEFAULT_REGISTRY, DigestUtils, ImageReference};
use crate::logging::Logger;
use crate::registry::Credentials;
use crate::runtime::ContainerRuntime;
use async_trait::async_trait;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    output: Logger,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, output: Logger) -> Self {
        Self {
            binary: binary.into(),
            output,
        }
    }

    /// Fail early when the docker daemon cannot be reached
    pub async fn check_available(&self) -> Result<String> {
        let output = self
            .run(&["version", "--format", "{{.Server.Version}}"])
            .await?;
        let version = String::from_utf8(output.stdout)?.trim().to_string();
        self.output
            .verbose(&format!("Docker server version: {}", version));
        Ok(version)
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        self.output
            .detail(&format!("$ {} {}", self.binary, args.join(" ")));

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SyncError::Runtime(format!("Failed to run {}: {}", self.binary, e)))?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(command_error(&self.binary, args, &output))
        }
    }
}

fn command_error(binary: &str, args: &[&str], output: &Output) -> SyncError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    SyncError::Runtime(format!(
        "`{} {}` exited with {}: {}",
        binary,
        args.first().copied().unwrap_or_default(),
        output.status,
        stderr.trim()
    ))
}

/// Names docker may use for `image` in `RepoDigests`
fn repo_digest_names(image: &ImageReference) -> Vec<String> {
    let mut names = vec![image.name()];
    if image.effective_registry() == DEFAULT_REGISTRY {
        names.push(image.repository().to_string());
        names.push(format!("{}/{}", DEFAULT_REGISTRY, image.repository()));
        if let Some(official) = image.repository().strip_prefix("library/") {
            names.push(official.to_string());
        }
    }
    names
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn login(&self, registry: &str, credentials: &Credentials) -> Result<()> {
        let args = [
            "login",
            registry,
            "--username",
            credentials.username.as_str(),
            "--password-stdin",
        ];
        self.output
            .detail(&format!("$ {} {}", self.binary, args.join(" ")));

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SyncError::Runtime(format!("Failed to run {}: {}", self.binary, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(credentials.password().as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(SyncError::Auth(format!(
                "docker login to {} failed: {}",
                registry,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        self.output
            .success(&format!("Logged in to {} as {}", registry, credentials.username));
        Ok(())
    }

    async fn pull(&self, image: &ImageReference) -> Result<()> {
        self.run(&["pull", &image.to_string()]).await.map(|_| ())
    }

    async fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<()> {
        self.run(&["tag", &source.to_string(), &target.to_string()])
            .await
            .map(|_| ())
    }

    async fn push(&self, image: &ImageReference) -> Result<()> {
        self.run(&["push", &image.to_string()]).await.map(|_| ())
    }

    async fn remove(&self, image: &ImageReference) -> Result<()> {
        self.run(&["rmi", &image.to_string()]).await.map(|_| ())
    }

    async fn repo_digest(&self, image: &ImageReference) -> Result<Option<String>> {
        let output = self
            .run(&[
                "image",
                "inspect",
                "--format",
                "{{json .RepoDigests}}",
                &image.to_string(),
            ])
            .await?;

        let stdout = String::from_utf8(output.stdout)?;
        let repo_digests: Option<Vec<String>> = serde_json::from_str(stdout.trim())?;
        let names = repo_digest_names(image);

        Ok(repo_digests.unwrap_or_default().iter().find_map(|entry| {
            let (name, digest) = DigestUtils::split_repo_digest(entry)?;
            if names.iter().any(|n| n == name) {
                DigestUtils::normalize_digest(digest).ok()
            } else {
                None
            }
        }))
    }
}
