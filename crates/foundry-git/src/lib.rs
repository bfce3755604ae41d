//! ---
//! fdy_section: "05-networking-external-interfaces"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Archetype git mirror and subprocess execution."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Local mirrors of archetype repositories.
//!
//! Every archetype gets one working copy under the configured root. Code
//! initialization clones or refreshes it, points an extra remote at the
//! project's git URL and pushes the production branch there. All git
//! invocations go through [`ProcessRunner`].

use std::io;
use std::path::PathBuf;

pub mod mirror;
pub mod process;

pub use mirror::{repository_name, GitMirror, MirrorRegistry};
pub use process::{CommandCapture, GitInvocation, ProcessRunner, SystemProcessRunner};

/// Errors raised while driving git.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("`{command_line}` exited with code {exit_code}: {stderr}")]
    ProcessFailed {
        command_line: String,
        exit_code: i32,
        stderr: String,
    },
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot derive a repository name from '{0}'")]
    InvalidUri(String),
}

impl GitError {
    /// Exit code of a failed git process, if the process ran at all.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            GitError::ProcessFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GitError>;
