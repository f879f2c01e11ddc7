// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Target file layout on disk.
//!
//! Every target file `F` may be accompanied by backup artifacts living next
//! to it in the same directory:
//!
//! - `F.debk`: the __failsafe backup__. Holds the pristine template exactly as
//!   it was before the first patch ever applied to `F`. Created once, never
//!   overwritten.
//! - `F.save.N`: __save files__. Each later patch keeps the previous content
//!   of `F` as `F.save.0`, after shifting older saves up by one.
//!
//! Working files, named `.F.<random>.deploy-env`, only exist while a patch is
//! in progress. None of these artifacts is ever a target itself.

use nix::unistd::{access, AccessFlags};
use std::{
    ffi::OsString,
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Suffix of failsafe backup.
pub const FAILSAFE_EXTENSION: &str = "debk";

/// Infix of numbered save files.
pub const SAVE_EXTENSION: &str = "save";

/// Suffix of working files.
pub const WORKING_EXTENSION: &str = "deploy-env";

/// File that placeholders get substituted in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetFile {
    path: PathBuf,
}

impl TargetFile {
    /// Construct new target file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to primary file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Path to failsafe backup.
    pub fn failsafe_path(&self) -> PathBuf {
        self.with_suffix(FAILSAFE_EXTENSION)
    }

    /// Path to numbered save file.
    pub fn save_path(&self, number: u32) -> PathBuf {
        self.with_suffix(format!("{SAVE_EXTENSION}.{number}"))
    }

    /// Check if path names a failsafe backup, save file, or working file.
    pub fn is_artifact(path: impl AsRef<Path>) -> bool {
        let Some(name) = path.as_ref().file_name().and_then(|name| name.to_str()) else {
            return false;
        };

        if name.ends_with(&format!(".{FAILSAFE_EXTENSION}")) {
            return true;
        }

        if name.starts_with('.') && name.ends_with(&format!(".{WORKING_EXTENSION}")) {
            return true;
        }

        name.rsplit_once(&format!(".{SAVE_EXTENSION}."))
            .is_some_and(|(stem, number)| {
                !stem.is_empty()
                    && !number.is_empty()
                    && number.bytes().all(|byte| byte.is_ascii_digit())
            })
    }

    /// Directory containing primary file.
    pub fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Determine where pristine content should be read from.
    ///
    /// The failsafe backup always wins over the primary file, because the
    /// primary file may already hold the output of an earlier patch.
    pub fn source(&self) -> Source {
        let failsafe = self.failsafe_path();
        if failsafe.symlink_metadata().is_ok() {
            Source {
                path: failsafe,
                failsafe: true,
            }
        } else {
            Source {
                path: self.path.clone(),
                failsafe: false,
            }
        }
    }

    /// Validate target file before anything is read or written.
    ///
    /// Checks that the primary file exists and is a regular file, and that
    /// the current source can be read. With [`Access::ReadWrite`] the
    /// directory must also be writable, since working files, backups and save
    /// files are all created there.
    ///
    /// # Errors
    ///
    /// - Return [`TargetError::Missing`] if primary file does not exist.
    /// - Return [`TargetError::NotAFile`] if primary file is not a regular
    ///   file.
    /// - Return [`TargetError::Unreadable`] if source cannot be opened.
    /// - Return [`TargetError::ReadOnlyDirectory`] if directory is not
    ///   writable under [`Access::ReadWrite`].
    pub fn validate(&self, mode: Access) -> Result<()> {
        let metadata = fs::metadata(&self.path).map_err(|err| TargetError::Missing {
            source: err,
            path: self.path.clone(),
        })?;

        if !metadata.is_file() {
            return Err(TargetError::NotAFile {
                path: self.path.clone(),
            });
        }

        let source = self.source();
        File::open(&source.path).map_err(|err| TargetError::Unreadable {
            source: err,
            path: source.path.clone(),
        })?;

        if mode == Access::ReadWrite {
            access(self.directory(), AccessFlags::W_OK).map_err(|err| {
                TargetError::ReadOnlyDirectory {
                    source: err,
                    path: self.directory().to_path_buf(),
                }
            })?;
        }

        Ok(())
    }

    /// Detect current backup lifecycle state.
    ///
    /// # Errors
    ///
    /// - Return [`TargetError::ListSaves`] if directory cannot be listed.
    pub fn backup_state(&self) -> Result<BackupState> {
        if self.failsafe_path().symlink_metadata().is_err() {
            return Ok(BackupState::Pristine);
        }

        let saves = self.list_saves()?;
        if saves.is_empty() {
            Ok(BackupState::Failsafe)
        } else {
            Ok(BackupState::Saved(saves))
        }
    }

    /// List numbers of existing save files, highest first.
    ///
    /// Directories that happen to carry a save file name are not save files,
    /// and are left out.
    ///
    /// # Errors
    ///
    /// - Return [`TargetError::ListSaves`] if directory cannot be listed.
    pub fn list_saves(&self) -> Result<Vec<u32>> {
        let Some(file_name) = self.path.file_name() else {
            return Ok(Vec::new());
        };
        let mut prefix = file_name.to_os_string();
        prefix.push(format!(".{SAVE_EXTENSION}."));
        let prefix = prefix.to_string_lossy().into_owned();

        let entries = fs::read_dir(self.directory()).map_err(|err| TargetError::ListSaves {
            source: err,
            path: self.directory().to_path_buf(),
        })?;

        let mut saves = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| TargetError::ListSaves {
                source: err,
                path: self.directory().to_path_buf(),
            })?;
            let is_dir = entry
                .file_type()
                .map_err(|err| TargetError::ListSaves {
                    source: err,
                    path: self.directory().to_path_buf(),
                })?
                .is_dir();
            if is_dir {
                continue;
            }

            let name = entry.file_name();
            let Some(number) = name
                .to_str()
                .and_then(|name| name.strip_prefix(prefix.as_str()))
                .filter(|number| number.bytes().all(|byte| byte.is_ascii_digit()))
                .and_then(|number| number.parse::<u32>().ok())
            else {
                continue;
            };
            saves.push(number);
        }

        saves.sort_unstable_by(|a, b| b.cmp(a));
        Ok(saves)
    }

    /// Shift save files up by one to free `F.save.0`.
    ///
    /// Renames happen from the highest number down, so no rename ever lands
    /// on a save file that has not been moved yet.
    ///
    /// # Errors
    ///
    /// - Return [`TargetError::SaveLimit`] if a save file already has the
    ///   highest possible number. Nothing is renamed in that case.
    /// - Return [`TargetError::Rotate`] if a save file cannot be renamed.
    pub fn rotate_saves(&self, saves: &[u32]) -> Result<()> {
        let mut saves = saves
            .iter()
            .map(|number| {
                number
                    .checked_add(1)
                    .map(|next| (*number, next))
                    .ok_or_else(|| TargetError::SaveLimit {
                        path: self.save_path(*number),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        saves.sort_unstable_by(|a, b| b.cmp(a));

        for (number, next) in saves {
            let from = self.save_path(number);
            let to = self.save_path(next);
            debug!("rotate {:?} to {:?}", from.display(), to.display());
            fs::rename(&from, &to).map_err(|err| TargetError::Rotate {
                source: err,
                from: from.clone(),
                to: to.clone(),
            })?;
        }

        Ok(())
    }

    fn with_suffix(&self, suffix: impl AsRef<str>) -> PathBuf {
        let mut path = OsString::from(self.path.as_os_str());
        path.push(".");
        path.push(suffix.as_ref());
        PathBuf::from(path)
    }
}

/// Where template content is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Path to read.
    pub path: PathBuf,

    /// Path is the failsafe backup instead of the primary file.
    pub failsafe: bool,
}

impl Source {
    /// Read source content.
    ///
    /// # Errors
    ///
    /// - Return [`TargetError::Read`] if source cannot be read.
    pub fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|err| TargetError::Read {
            source: err,
            path: self.path.clone(),
        })
    }
}

/// Access a target file is validated for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Only read, e.g., for parameter listing.
    Read,

    /// Read, patch, and replace.
    #[default]
    ReadWrite,
}

/// Backup lifecycle of a target file.
///
/// ```text
/// Pristine --first commit--> Failsafe --commit--> Saved([0]) --commit--> Saved([1, 0]) ...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupState {
    /// No failsafe backup yet, the primary file is the pristine template.
    Pristine,

    /// Failsafe backup exists, but no save files.
    Failsafe,

    /// Failsafe backup and save files exist, numbers highest first.
    Saved(Vec<u32>),
}

/// Target file error types.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// Primary file does not exist or cannot be inspected.
    #[error("target file {:?} does not exist", path.display())]
    Missing {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Primary file is not a regular file.
    #[error("target {:?} is not a regular file", path.display())]
    NotAFile { path: PathBuf },

    /// Source cannot be opened for reading.
    #[error("cannot read {:?}", path.display())]
    Unreadable {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory of target file is not writable.
    #[error("directory {:?} is not writable", path.display())]
    ReadOnlyDirectory {
        #[source]
        source: nix::errno::Errno,
        path: PathBuf,
    },

    /// Source content cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory cannot be listed for save files.
    #[error("failed to list save files in {:?}", path.display())]
    ListSaves {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Save file number cannot be shifted any higher.
    #[error("cannot rotate save file {:?}, number out of range", path.display())]
    SaveLimit { path: PathBuf },

    /// Save file cannot be rotated.
    #[error("failed to rotate save file {:?} to {:?}", from.display(), to.display())]
    Rotate {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = TargetError> = std::result::Result<T, E>;
