//! Self-update of the installed scripts and GUI.
//!
//! Compares the locally recorded version against the latest commit on the
//! remote default branch, and installs a fresh archive of that branch over
//! the configured subtrees. Partial copies are not rolled back.

use crate::config::UpdateConfig;
use crate::error::ManagerError;
use crate::http::{create_client, create_client_with_timeout, DOWNLOAD_TIMEOUT};
use crate::persist::{read_json, write_json};
use crate::process::Supervisor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const UNKNOWN_VERSION: &str = "unknown";
const SHORT_SHA_LEN: usize = 7;

/// Persisted record of what is installed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionMarker {
    pub local_script_version: String,
    #[serde(default)]
    pub last_known_remote_commit_sha: Option<String>,
    #[serde(default)]
    pub last_check_timestamp: Option<DateTime<Utc>>,
}

impl Default for VersionMarker {
    fn default() -> Self {
        Self {
            local_script_version: UNKNOWN_VERSION.to_string(),
            last_known_remote_commit_sha: None,
            last_check_timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub has_update: bool,
    pub current_version: String,
    pub latest_commit: String,
    pub latest_commit_sha: String,
    pub latest_message: String,
    pub latest_date: Option<String>,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallResult {
    pub success: bool,
    pub previous_version: String,
    pub new_version: String,
    pub files_updated: usize,
    pub restarted: bool,
    pub message: String,
}

#[derive(Deserialize)]
struct GitHubCommit {
    sha: String,
    commit: GitHubCommitDetail,
}

#[derive(Deserialize)]
struct GitHubCommitDetail {
    message: String,
    #[serde(default)]
    author: Option<GitHubAuthor>,
}

#[derive(Deserialize)]
struct GitHubAuthor {
    #[serde(default)]
    date: Option<String>,
}

pub fn short_sha(sha: &str) -> String {
    sha.chars().take(SHORT_SHA_LEN).collect()
}

pub struct Updater {
    settings: UpdateConfig,
    marker_path: PathBuf,
}

impl Updater {
    pub fn new(settings: UpdateConfig, marker_path: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            marker_path: marker_path.into(),
        }
    }

    pub fn marker(&self) -> VersionMarker {
        match read_json::<VersionMarker>(&self.marker_path) {
            Ok(marker) => marker.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "version marker unreadable");
                VersionMarker::default()
            }
        }
    }

    fn default_download_url(&self) -> String {
        format!(
            "{}/{}/archive/refs/heads/{}.zip",
            self.settings.archive_base.trim_end_matches('/'),
            self.settings.repo,
            self.settings.branch
        )
    }

    async fn latest_commit(&self) -> Result<GitHubCommit, ManagerError> {
        let url = format!(
            "{}/repos/{}/commits/{}",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.repo,
            self.settings.branch
        );
        let response = create_client()
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| ManagerError::UpstreamUnavailable(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ManagerError::UpstreamUnavailable(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ManagerError::UpstreamUnavailable(format!("invalid commit response: {}", e)))
    }

    /// Compare the installed version against the remote branch head.
    pub async fn check(&self) -> Result<UpdateInfo, ManagerError> {
        let latest = self.latest_commit().await?;
        let mut marker = self.marker();
        let latest_short = short_sha(&latest.sha);
        let has_update = marker.local_script_version == UNKNOWN_VERSION
            || short_sha(&marker.local_script_version) != latest_short;

        marker.last_known_remote_commit_sha = Some(latest.sha.clone());
        marker.last_check_timestamp = Some(Utc::now());
        write_json(&self.marker_path, &marker)?;

        Ok(UpdateInfo {
            has_update,
            current_version: marker.local_script_version,
            latest_commit: latest_short,
            latest_commit_sha: latest.sha,
            latest_message: latest.commit.message.lines().next().unwrap_or_default().to_string(),
            latest_date: latest.commit.author.and_then(|a| a.date),
            download_url: self.default_download_url(),
        })
    }

    /// Download, extract and install the branch archive around a proxy stop/start.
    pub async fn apply(
        &self,
        supervisor: &Supervisor,
        download_url: Option<String>,
    ) -> Result<InstallResult, ManagerError> {
        let previous_version = self.marker().local_script_version;
        let was_running = supervisor.find_process().is_some();
        if was_running {
            supervisor
                .stop()
                .await
                .map_err(|e| stage_error("stopping proxy", e))?;
        }

        let installed = self.install(download_url).await;

        let restarted = if was_running {
            match supervisor.start().await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "proxy did not come back after update");
                    false
                }
            }
        } else {
            false
        };

        let (new_version, files_updated) = installed?;
        tracing::info!(from = %previous_version, to = %new_version, files_updated, "update installed");

        Ok(InstallResult {
            success: true,
            message: format!("Updated {} -> {}", previous_version, new_version),
            previous_version,
            new_version,
            files_updated,
            restarted,
        })
    }

    async fn install(&self, download_url: Option<String>) -> Result<(String, usize), ManagerError> {
        let latest = self
            .latest_commit()
            .await
            .map_err(|e| stage_error("checking latest commit", e))?;
        let url = download_url.unwrap_or_else(|| self.default_download_url());

        let response = create_client_with_timeout(DOWNLOAD_TIMEOUT)
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| stage_error("downloading", ManagerError::UpstreamUnavailable(e.to_string())))?;
        let archive = response
            .bytes()
            .await
            .map_err(|e| stage_error("downloading", ManagerError::UpstreamUnavailable(e.to_string())))?
            .to_vec();

        let staging = std::env::temp_dir().join(format!("proxyctl-update-{}", uuid::Uuid::new_v4().simple()));
        let install_dir = self.settings.install_dir.clone();
        let subtrees = self.settings.subtrees.clone();
        let staging_for_task = staging.clone();

        let copied = tokio::task::spawn_blocking(move || {
            extract_and_install(&archive, &staging_for_task, &install_dir, &subtrees)
        })
        .await
        .map_err(|e| ManagerError::Internal(e.to_string()));

        if let Err(e) = std::fs::remove_dir_all(&staging) {
            tracing::debug!(error = %e, "staging cleanup failed");
        }
        let files_updated = copied??;

        let new_version = short_sha(&latest.sha);
        let marker = VersionMarker {
            local_script_version: new_version.clone(),
            last_known_remote_commit_sha: Some(latest.sha),
            last_check_timestamp: Some(Utc::now()),
        };
        write_json(&self.marker_path, &marker).map_err(|e| stage_error("writing version marker", e.into()))?;

        Ok((new_version, files_updated))
    }
}

fn stage_error(stage: &str, e: ManagerError) -> ManagerError {
    ManagerError::Internal(format!("update failed while {}: {}", stage, e))
}

fn extract_and_install(
    archive: &[u8],
    staging: &Path,
    install_dir: &Path,
    subtrees: &[String],
) -> Result<usize, ManagerError> {
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive))
        .map_err(|e| stage_error("extracting", ManagerError::InvalidInput(e.to_string())))?;
    zip.extract(staging)
        .map_err(|e| stage_error("extracting", ManagerError::Io(e.to_string())))?;

    let root = archive_root(staging)?;
    let mut copied = 0;
    let mut found_any = false;
    for subtree in subtrees {
        let source = root.join(subtree);
        if !source.is_dir() {
            tracing::warn!(subtree = %subtree, "subtree missing from archive");
            continue;
        }
        found_any = true;
        copied += copy_dir(&source, &install_dir.join(subtree))
            .map_err(|e| stage_error("copying files", e.into()))?;
    }

    if !found_any {
        return Err(stage_error(
            "copying files",
            ManagerError::NotFound(format!("subtrees {:?} in archive", subtrees)),
        ));
    }
    Ok(copied)
}

/// Branch archives wrap everything in one `<repo>-<branch>/` directory.
fn archive_root(staging: &Path) -> Result<PathBuf, ManagerError> {
    let entries: Vec<PathBuf> = std::fs::read_dir(staging)?
        .flatten()
        .map(|e| e.path())
        .collect();
    match entries.as_slice() {
        [single] if single.is_dir() => Ok(single.clone()),
        _ => Ok(staging.to_path_buf()),
    }
}

fn copy_dir(source: &Path, target: &Path) -> std::io::Result<usize> {
    std::fs::create_dir_all(target)?;
    let mut count = 0;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let dest = target.join(entry.file_name());
        if path.is_dir() {
            count += copy_dir(&path, &dest)?;
        } else {
            std::fs::copy(&path, &dest)?;
            count += 1;
        }
    }
    Ok(count)
}
