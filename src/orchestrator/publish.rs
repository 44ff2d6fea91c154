//! Publishing of final results after the publish stage.

use crate::catalog::ResultMap;
use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// What the publisher receives once stage 8 has run.
#[derive(Debug, Clone, Serialize)]
pub struct PublishRequest {
    pub run_id: String,
    pub scaffold_id: String,
    pub scaffold_version: String,
    pub results: ResultMap,
    pub published_at: DateTime<Utc>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Persist or publish the final results. Returns a location or handle
    /// recorded in the execution report.
    async fn publish(&self, request: &PublishRequest) -> Result<String, EngineError>;
}

/// Writes `published_{scaffold}_{run}.json` into a directory.
#[derive(Debug, Clone)]
pub struct ReportDirPublisher {
    dir: PathBuf,
}

impl ReportDirPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Publisher for ReportDirPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<String, EngineError> {
        let bytes = serde_json::to_vec_pretty(request)?;
        let path = self.dir.join(format!(
            "published_{}_{}.json",
            request.scaffold_id, request.run_id
        ));
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| EngineError::Publish(format!("create {}: {}", self.dir.display(), e)))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| EngineError::Publish(format!("write {}: {}", path.display(), e)))?;
        info!(scaffold_id = %request.scaffold_id, path = %path.display(), "Results published");
        Ok(path.display().to_string())
    }
}

/// Commits each publication into a git repository and optionally pushes it.
///
/// Results are written under `published/` in the repository, staged and
/// committed. The returned location is `<repo>@<commit>`.
#[derive(Debug, Clone)]
pub struct GitPublisher {
    repo: PathBuf,
    remote: Option<String>,
    branch: Option<String>,
}

impl GitPublisher {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            remote: None,
            branch: None,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    /// Branch pushed to the remote; the current `HEAD` when unset.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    async fn git(&self, args: &[&str]) -> Result<String, EngineError> {
        debug!(repo = %self.repo.display(), ?args, "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Publish(format!("spawn git: {}", e)))?;
        if !output.status.success() {
            return Err(EngineError::Publish(format!(
                "git {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<String, EngineError> {
        let written = ReportDirPublisher::new(self.repo.join("published"))
            .publish(request)
            .await?;
        let path = PathBuf::from(&written);
        let relative = path.strip_prefix(&self.repo).unwrap_or(&path).to_string_lossy();
        let relative = relative.as_ref();

        self.git(&["add", "--", relative]).await?;
        let message = format!(
            "Publish {} {} (run {})",
            request.scaffold_id, request.scaffold_version, request.run_id
        );
        self.git(&["commit", "-m", message.as_str(), "--", relative]).await?;
        let commit = self.git(&["rev-parse", "HEAD"]).await?;

        if let Some(remote) = &self.remote {
            let branch = self.branch.as_deref().unwrap_or("HEAD");
            self.git(&["push", remote.as_str(), branch]).await?;
            info!(remote = %remote, branch, commit = %commit, "Publish commit pushed");
        }
        info!(scaffold_id = %request.scaffold_id, commit = %commit, "Results committed");
        Ok(format!("{}@{}", self.repo.display(), commit))
    }
}
