// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File patching.
//!
//! Substitute placeholders in a set of target files, and commit the results
//! without ever leaving a half-written target behind.
//!
//! # Patch Run
//!
//! A run over a set of target files happens in three phases:
//!
//! 1. __Validate__ every target. Nothing is read or written when any target
//!    is missing, unreadable, or sits in a read-only directory.
//! 2. __Prepare__ every target. The pristine template is read, either from
//!    the failsafe backup or from the primary file if there is no backup yet.
//!    Each line is patched, and the result is staged in a working file.
//!    Targets that came out unmodified drop their working file immediately.
//! 3. __Commit__ every modified target, unless strict mode is on and some
//!    placeholder could not be resolved. In that case the run aborts before
//!    the first commit.
//!
//! # Commit
//!
//! The first commit of a target hard-links the primary file to its failsafe
//! backup. Later commits rotate save files, and hard-link the primary file to
//! `F.save.0` instead. Ownership and permissions of the primary file are
//! copied onto the working file, which is then renamed over the primary file.
//! Rename is atomic, and only attempted after the backup link exists, so the
//! primary file either holds its old content or the new one.
//!
//! Patching always restarts from the pristine template. Running the patcher
//! again, even with a different environment, yields a fresh result instead
//! of compounding earlier substitutions.

pub mod target;
pub mod working;

use crate::{
    env::Resolve,
    patch::{
        target::{Access, BackupState, TargetError, TargetFile},
        working::WorkingFile,
    },
    template::{patch_text, MissingVariable},
};

use nix::unistd::geteuid;
use std::{
    fs,
    os::unix::fs::{chown, MetadataExt},
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument, warn};

/// Policy for undefined variables.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Report undefined variables, and leave their placeholders untouched.
    #[default]
    Lenient,

    /// Abort the run before committing anything on undefined variables.
    Strict,
}

/// Patch target files against a variable resolver.
#[derive(Debug)]
pub struct Patcher<'a, R>
where
    R: Resolve,
{
    resolver: &'a R,
    policy: Policy,
}

impl<'a, R> Patcher<'a, R>
where
    R: Resolve,
{
    /// Construct new patcher.
    pub fn new(resolver: &'a R, policy: Policy) -> Self {
        Self { resolver, policy }
    }

    /// Patch all target files in order.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Target`] if validation or reading fails.
    /// - Return [`PatchError::Unresolved`] in strict mode if any placeholder
    ///   refers to an undefined variable.
    /// - Return [`PatchError::Working`] if working file cannot be written.
    /// - Return [`PatchError::Backup`], or [`PatchError::Replace`] if commit
    ///   fails.
    pub fn patch_all(&self, targets: &[TargetFile]) -> Result<PatchSummary> {
        for target in targets {
            target.validate(Access::ReadWrite)?;
        }

        let prepared = targets
            .iter()
            .map(|target| self.prepare(target))
            .collect::<Result<Vec<_>>>()?;

        let missing = prepared
            .iter()
            .map(|patch| patch.report.missing.len())
            .sum::<usize>();
        if self.policy == Policy::Strict && missing > 0 {
            let files = prepared
                .iter()
                .filter(|patch| !patch.report.missing.is_empty())
                .count();
            return Err(PatchError::Unresolved { missing, files });
        }

        let mut summary = PatchSummary::default();
        for patch in prepared {
            let report = patch.report.clone();
            let outcome = patch.commit()?;
            summary.files.push(FileOutcome { report, outcome });
        }

        Ok(summary)
    }

    /// Prepare patch of a single target file.
    ///
    /// Reads the pristine template, patches it, and stages the result in a
    /// working file. Undefined variables are logged with their line number.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Target`] if source cannot be read.
    /// - Return [`PatchError::Working`] if working file cannot be written.
    #[instrument(skip(self, target), fields(file = %target.path().display()), level = "debug")]
    pub fn prepare(&self, target: &TargetFile) -> Result<PreparedPatch> {
        let source = target.source();
        if source.failsafe {
            warn!(
                "restoring {:?} from failsafe backup {:?}",
                target.path().display(),
                source.path.display()
            );
        }

        let mut working = WorkingFile::create_for(target).map_err(|err| PatchError::Working {
            source: err,
            path: target.path().to_path_buf(),
        })?;

        let content = source.read()?;
        let patch = patch_text(&content, self.resolver);
        for missing in &patch.missing {
            match self.policy {
                Policy::Lenient => warn!(
                    "{}:{}: variable {:?} is not defined",
                    target.path().display(),
                    missing.line,
                    missing.name
                ),
                Policy::Strict => error!(
                    "{}:{}: variable {:?} is not defined",
                    target.path().display(),
                    missing.line,
                    missing.name
                ),
            }
        }

        let report = FilePatch {
            path: target.path().to_path_buf(),
            modified: patch.modified,
            missing: patch.missing,
        };

        // INVARIANT: Unmodified targets never reach the commit phase.
        let working = if patch.modified {
            working
                .write_all(&patch.content)
                .map_err(|err| PatchError::Working {
                    source: err,
                    path: target.path().to_path_buf(),
                })?;
            Some(working)
        } else {
            debug!("{:?} unchanged, nothing to commit", target.path().display());
            drop(working);
            None
        };

        Ok(PreparedPatch {
            target: target.clone(),
            working,
            report,
        })
    }
}

/// Patched target waiting to be committed.
#[derive(Debug)]
pub struct PreparedPatch {
    target: TargetFile,
    working: Option<WorkingFile>,
    report: FilePatch,
}

impl PreparedPatch {
    /// Report of patched target.
    pub fn report(&self) -> &FilePatch {
        &self.report
    }

    /// Commit patched content to target file.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Target`] if save files cannot be rotated.
    /// - Return [`PatchError::Metadata`] if permissions cannot be copied.
    /// - Return [`PatchError::Backup`] if backup link cannot be made.
    /// - Return [`PatchError::Replace`] if working file cannot be renamed.
    #[instrument(skip(self), fields(file = %self.target.path().display()), level = "debug")]
    pub fn commit(self) -> Result<Outcome> {
        let Some(working) = self.working else {
            return Ok(Outcome::Unchanged);
        };
        let primary = self.target.path();

        let state = self.target.backup_state()?;
        let backup = match &state {
            BackupState::Pristine => self.target.failsafe_path(),
            BackupState::Failsafe => self.target.save_path(0),
            BackupState::Saved(saves) => {
                self.target.rotate_saves(saves)?;
                self.target.save_path(0)
            }
        };

        copy_metadata(primary, working.path())?;

        fs::hard_link(primary, &backup).map_err(|err| PatchError::Backup {
            source: err,
            path: primary.to_path_buf(),
            backup: backup.clone(),
        })?;

        working.persist(primary).map_err(|err| PatchError::Replace {
            source: err,
            path: primary.to_path_buf(),
        })?;

        info!("patched {:?}, backup at {:?}", primary.display(), backup.display());
        Ok(Outcome::Committed { backup, state })
    }
}

/// Copy ownership and permissions of one file onto another.
///
/// Only root may give files away, so failing to copy ownership is an error
/// for root, and a warning for everyone else.
fn copy_metadata(from: &Path, to: &Path) -> Result<()> {
    let metadata = fs::metadata(from).map_err(|err| PatchError::Metadata {
        source: err,
        path: from.to_path_buf(),
    })?;

    // INVARIANT: Change owner before mode, since chown may clear setuid bits.
    if let Err(err) = chown(to, Some(metadata.uid()), Some(metadata.gid())) {
        if geteuid().is_root() {
            return Err(PatchError::Metadata {
                source: err,
                path: from.to_path_buf(),
            });
        }
        warn!("cannot copy ownership of {:?}: {err}", from.display());
    }

    fs::set_permissions(to, metadata.permissions()).map_err(|err| PatchError::Metadata {
        source: err,
        path: from.to_path_buf(),
    })?;

    Ok(())
}

/// Report on patching a single target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    /// Path to primary file.
    pub path: PathBuf,

    /// Any line changed.
    pub modified: bool,

    /// Undefined references across all lines.
    pub missing: Vec<MissingVariable>,
}

/// What commit did to a target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing changed, nothing written.
    Unchanged,

    /// Target replaced, previous content kept at backup path.
    Committed {
        backup: PathBuf,
        state: BackupState,
    },
}

/// Report and outcome of a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub report: FilePatch,
    pub outcome: Outcome,
}

/// Outcome of a full patch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchSummary {
    pub files: Vec<FileOutcome>,
}

impl PatchSummary {
    /// Number of targets that were replaced.
    pub fn committed(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.outcome, Outcome::Committed { .. }))
            .count()
    }

    /// Number of undefined references across all targets.
    pub fn missing(&self) -> usize {
        self.files
            .iter()
            .map(|file| file.report.missing.len())
            .sum()
    }
}

/// Patch error types.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Target file validation or access fails.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// Strict mode found undefined variables.
    #[error("{missing} undefined variable reference(s) in {files} file(s), nothing committed")]
    Unresolved { missing: usize, files: usize },

    /// Working file cannot be created or written.
    #[error("failed to stage patched content for {:?}", path.display())]
    Working {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Ownership or permissions cannot be copied.
    #[error("failed to copy ownership and permissions of {:?}", path.display())]
    Metadata {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backup link cannot be created.
    #[error("failed to back up {:?} to {:?}", path.display(), backup.display())]
    Backup {
        #[source]
        source: std::io::Error,
        path: PathBuf,
        backup: PathBuf,
    },

    /// Working file cannot replace target file.
    #[error("failed to replace {:?}", path.display())]
    Replace {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = PatchError> = std::result::Result<T, E>;
