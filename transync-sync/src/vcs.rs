//! Version-control access.
//!
//! The engine only sees [`VersionControl`]. [`GitCli`] runs the `git`
//! binary against a working copy; [`InMemoryVcs`] holds revisions as maps
//! and backs tests and dry experiments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use transync_core::{DocPath, RevisionId};

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {args}` failed ({status}): {stderr}")]
    Command {
        args: String,
        status: String,
        stderr: String,
    },

    #[error("unknown revision: {0}")]
    UnknownRevision(String),
}

/// How a path changed between two revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed { from: DocPath },
    Copied { from: DocPath },
    Other { code: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPath {
    pub path: DocPath,
    #[serde(flatten)]
    pub status: ChangeStatus,
}

pub trait VersionControl: Send + Sync {
    /// Resolve a symbolic revision to its canonical id.
    fn resolve(&self, rev: &str) -> Result<RevisionId, VcsError>;

    fn changed_paths(&self, old: &RevisionId, new: &RevisionId) -> Result<Vec<ChangedPath>, VcsError>;

    /// Content of `path` at `rev`, or `None` when it does not exist there.
    fn read_file_at(&self, path: &DocPath, rev: &RevisionId) -> Result<Option<String>, VcsError>;

    fn list_files_at(&self, rev: &RevisionId) -> Result<Vec<DocPath>, VcsError>;
}

// ---------------------------------------------------------------------------
// git
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn fetch(&self, remote: &str) -> Result<(), VcsError> {
        tracing::info!("fetching {remote}");
        self.run(&["fetch", "--quiet", remote])?;
        Ok(())
    }

    fn output(&self, args: &[&str]) -> Result<std::process::Output, VcsError> {
        tracing::debug!("git {}", args.join(" "));
        Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .output()
            .map_err(|source| VcsError::Spawn {
                program: "git".to_string(),
                source,
            })
    }

    fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(VcsError::Command {
                args: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl VersionControl for GitCli {
    fn resolve(&self, rev: &str) -> Result<RevisionId, VcsError> {
        let spec = format!("{rev}^{{commit}}");
        match self.run(&["rev-parse", "--verify", "--quiet", &spec]) {
            Ok(out) => Ok(RevisionId::from(out.trim())),
            Err(VcsError::Command { .. }) => Err(VcsError::UnknownRevision(rev.to_string())),
            Err(e) => Err(e),
        }
    }

    fn changed_paths(&self, old: &RevisionId, new: &RevisionId) -> Result<Vec<ChangedPath>, VcsError> {
        let out = self.run(&[
            "diff",
            "--no-renames",
            "--name-status",
            old.as_str(),
            new.as_str(),
        ])?;
        Ok(parse_name_status(&out))
    }

    fn read_file_at(&self, path: &DocPath, rev: &RevisionId) -> Result<Option<String>, VcsError> {
        let object = format!("{rev}:{path}");
        let output = self.output(&["show", &object])?;
        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("does not exist") || stderr.contains("exists on disk, but not in") {
            return Ok(None);
        }
        Err(VcsError::Command {
            args: format!("show {object}"),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }

    fn list_files_at(&self, rev: &RevisionId) -> Result<Vec<DocPath>, VcsError> {
        let out = self.run(&["ls-tree", "-r", "--name-only", rev.as_str()])?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .map(DocPath::from)
            .collect())
    }
}

/// Parse `git diff --name-status` output.
///
/// Rename and copy lines carry a similarity score (`R087`) and two paths;
/// unknown status letters are kept verbatim.
pub fn parse_name_status(output: &str) -> Vec<ChangedPath> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let code = fields.next()?.trim();
            let first = fields.next()?;
            let second = fields.next();
            let (status, path) = match code.chars().next()? {
                'A' => (ChangeStatus::Added, first),
                'M' => (ChangeStatus::Modified, first),
                'D' => (ChangeStatus::Deleted, first),
                'R' => (
                    ChangeStatus::Renamed {
                        from: DocPath::from(first),
                    },
                    second?,
                ),
                'C' => (
                    ChangeStatus::Copied {
                        from: DocPath::from(first),
                    },
                    second?,
                ),
                _ => (
                    ChangeStatus::Other {
                        code: code.to_string(),
                    },
                    first,
                ),
            };
            Some(ChangedPath {
                path: DocPath::from(path),
                status,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Revisions as path → content maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVcs {
    revisions: BTreeMap<RevisionId, BTreeMap<DocPath, String>>,
}

impl InMemoryVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_revision<P, C>(mut self, rev: &str, files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<DocPath>,
        C: Into<String>,
    {
        self.revisions.insert(
            RevisionId::from(rev),
            files
                .into_iter()
                .map(|(p, c)| (p.into(), c.into()))
                .collect(),
        );
        self
    }

    fn tree(&self, rev: &RevisionId) -> Result<&BTreeMap<DocPath, String>, VcsError> {
        self.revisions
            .get(rev)
            .ok_or_else(|| VcsError::UnknownRevision(rev.to_string()))
    }
}

impl VersionControl for InMemoryVcs {
    fn resolve(&self, rev: &str) -> Result<RevisionId, VcsError> {
        let id = RevisionId::from(rev);
        self.tree(&id)?;
        Ok(id)
    }

    fn changed_paths(&self, old: &RevisionId, new: &RevisionId) -> Result<Vec<ChangedPath>, VcsError> {
        let before = self.tree(old)?;
        let after = self.tree(new)?;
        let mut changes = Vec::new();
        for (path, content) in after {
            match before.get(path) {
                None => changes.push(ChangedPath {
                    path: path.clone(),
                    status: ChangeStatus::Added,
                }),
                Some(prev) if prev != content => changes.push(ChangedPath {
                    path: path.clone(),
                    status: ChangeStatus::Modified,
                }),
                Some(_) => {}
            }
        }
        for path in before.keys().filter(|p| !after.contains_key(*p)) {
            changes.push(ChangedPath {
                path: path.clone(),
                status: ChangeStatus::Deleted,
            });
        }
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    fn read_file_at(&self, path: &DocPath, rev: &RevisionId) -> Result<Option<String>, VcsError> {
        Ok(self.tree(rev)?.get(path).cloned())
    }

    fn list_files_at(&self, rev: &RevisionId) -> Result<Vec<DocPath>, VcsError> {
        Ok(self.tree(rev)?.keys().cloned().collect())
    }
}
