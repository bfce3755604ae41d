//! ---
//! fdy_section: "05-networking-external-interfaces"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Archetype git mirror and subprocess execution."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use foundry_common::GitConfig;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info};

use crate::process::{CommandCapture, GitInvocation, ProcessRunner};
use crate::{GitError, Result};

/// Exit code git uses when `remote add` targets an existing remote.
const REMOTE_EXISTS_EXIT_CODE: i32 = 3;
const PUSH_NO_WAIT_ENV: &str = "PLATFORM_PUSH_NO_WAIT";
const SSH_COMMAND_ENV: &str = "GIT_SSH_COMMAND";

/// Last path segment of a repository URI without a `.git` suffix.
///
/// Handles URLs (`https://host/org/repo.git`) and scp-style URIs
/// (`user@host:repo.git`).
pub fn repository_name(uri: &str) -> Result<String> {
    let trimmed = uri.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(|c: char| c == '/' || c == ':')
        .next()
        .unwrap_or_default();
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() || name == "." || name == ".." {
        return Err(GitError::InvalidUri(uri.to_owned()));
    }
    Ok(name.to_owned())
}

fn directory_name(archetype_id: u64, uri: &str) -> Result<String> {
    Ok(format!("{archetype_id}-{}", repository_name(uri)?))
}

/// One async mutex per archetype, so concurrent code initializations of
/// projects sharing an archetype do not race on its working copy.
#[derive(Debug, Default)]
pub struct MirrorRegistry {
    locks: Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>,
}

impl MirrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, archetype_id: u64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(archetype_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Working copies of archetype repositories under a common root.
pub struct GitMirror {
    root: PathBuf,
    executable: String,
    private_key: Option<PathBuf>,
    runner: Arc<dyn ProcessRunner>,
    registry: MirrorRegistry,
}

impl std::fmt::Debug for GitMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitMirror")
            .field("root", &self.root)
            .field("executable", &self.executable)
            .field("private_key", &self.private_key)
            .finish_non_exhaustive()
    }
}

impl GitMirror {
    pub fn new(
        root: impl Into<PathBuf>,
        executable: impl Into<String>,
        private_key: Option<PathBuf>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            root: root.into(),
            executable: executable.into(),
            private_key,
            runner,
            registry: MirrorRegistry::new(),
        }
    }

    pub fn from_config(config: &GitConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self::new(
            config.archetype_root.clone(),
            config.executable.clone(),
            config.private_key.clone(),
            runner,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working copy location for an archetype: `<root>/<id>-<repo name>`.
    pub fn directory_for(&self, archetype_id: u64, uri: &str) -> Result<PathBuf> {
        Ok(self.root.join(directory_name(archetype_id, uri)?))
    }

    /// Serialize work on one archetype's working copy.
    pub async fn lock_archetype(&self, archetype_id: u64) -> OwnedMutexGuard<()> {
        self.registry.lock(archetype_id).await
    }

    /// Clone the repository if its working copy is missing, otherwise pull.
    pub async fn ensure_repository(&self, archetype_id: u64, uri: &str) -> Result<PathBuf> {
        let directory = self.directory_for(archetype_id, uri)?;
        if tokio::fs::metadata(&directory).await.is_ok() {
            debug!(archetype = archetype_id, dir = %directory.display(), "refreshing mirror");
            self.git(&directory, &["pull", "--all"]).await?;
            return Ok(directory);
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| GitError::Io {
                path: self.root.clone(),
                source,
            })?;
        // Clone runs inside the root, so the target is relative to it.
        let target = directory_name(archetype_id, uri)?;
        info!(archetype = archetype_id, uri, dir = %directory.display(), "cloning archetype repository");
        self.git(&self.root, &["clone", uri, target.as_str()]).await?;
        Ok(directory)
    }

    /// Add a named remote, re-pointing it when it already exists.
    pub async fn add_remote(&self, directory: &Path, name: &str, uri: &str) -> Result<()> {
        match self.git(directory, &["remote", "add", name, uri]).await {
            Err(GitError::ProcessFailed { exit_code, .. })
                if exit_code == REMOTE_EXISTS_EXIT_CODE =>
            {
                debug!(remote = name, uri, "remote exists; updating url");
                self.git(directory, &["remote", "set-url", name, uri])
                    .await
                    .map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }

    pub async fn push_to_remote(&self, directory: &Path, name: &str, branch: &str) -> Result<()> {
        self.git(directory, &["push", name, branch]).await?;
        info!(remote = name, branch, dir = %directory.display(), "pushed mirror");
        Ok(())
    }

    /// Refresh the archetype mirror and push `branch` to `remote_uri`,
    /// holding the archetype lock for the whole sequence.
    pub async fn push_archetype(
        &self,
        archetype_id: u64,
        source_uri: &str,
        remote_name: &str,
        remote_uri: &str,
        branch: &str,
    ) -> Result<()> {
        let _guard = self.lock_archetype(archetype_id).await;
        let directory = self.ensure_repository(archetype_id, source_uri).await?;
        self.add_remote(&directory, remote_name, remote_uri).await?;
        self.push_to_remote(&directory, remote_name, branch).await
    }

    fn invocation(&self, cwd: &Path, args: &[&str]) -> GitInvocation {
        let mut invocation = GitInvocation::new(self.executable.clone(), cwd)
            .env(PUSH_NO_WAIT_ENV, "1");
        if let Some(key) = &self.private_key {
            invocation = invocation.env(SSH_COMMAND_ENV, format!("ssh -i {}", key.display()));
        }
        for arg in args {
            invocation = invocation.arg(*arg);
        }
        invocation
    }

    async fn git(&self, cwd: &Path, args: &[&str]) -> Result<CommandCapture> {
        let invocation = self.invocation(cwd, args);
        let capture = self.runner.run(&invocation).await?;
        if capture.success() {
            return Ok(capture);
        }
        let command_line = invocation.command_line();
        error!(
            command = %command_line,
            exit_code = capture.status,
            cwd = %cwd.display(),
            stderr = %capture.stderr,
            "git command failed"
        );
        Err(GitError::ProcessFailed {
            command_line,
            exit_code: capture.status,
            stderr: capture.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_names() {
        assert_eq!(
            repository_name("https://github.com/acme/shop-template.git").unwrap(),
            "shop-template"
        );
        assert_eq!(repository_name("git@github.com:acme/blog.git").unwrap(), "blog");
        assert_eq!(repository_name("abc@git.eu-3.platform.sh:abc.git").unwrap(), "abc");
        assert_eq!(repository_name("https://example.org/repos/site/").unwrap(), "site");
        assert!(repository_name("https://example.org/.git").is_err());
        assert!(repository_name("").is_err());
    }

    #[tokio::test]
    async fn registry_serializes_same_archetype_only() {
        let registry = Arc::new(MirrorRegistry::new());
        let held = registry.lock(7).await;

        let contender = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let _guard = registry.lock(7).await;
            })
        };
        // A different archetype is not blocked.
        let other = tokio::time::timeout(std::time::Duration::from_millis(200), registry.lock(8)).await;
        assert!(other.is_ok());

        tokio::task::yield_now().await;
        assert!(!contender.is_finished());
        drop(held);
        tokio::time::timeout(std::time::Duration::from_secs(5), contender)
            .await
            .expect("contender acquires after release")
            .unwrap();
    }
}
