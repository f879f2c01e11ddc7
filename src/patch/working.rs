// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Working files and their cleanup.
//!
//! Patched content is staged in a __working file__ placed in the same
//! directory as its target, so it can be renamed over the target atomically.
//! A working file must never outlive the process. Every working file is
//! registered in a process-wide registry when created, and deregistered once
//! it has been renamed into place or removed. Dropping a [`WorkingFile`]
//! removes it on every ordinary exit path, while
//! [`install_signal_cleanup`] covers termination by signal.

use crate::patch::target::{TargetFile, WORKING_EXTENSION};

use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM},
    iterator::Signals,
};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    sync::{Mutex, PoisonError},
    thread,
};
use tempfile::{Builder, NamedTempFile, PersistError};
use tracing::{debug, warn};

static REGISTRY: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

/// Temporary file holding patched content of a target.
#[derive(Debug)]
pub struct WorkingFile {
    file: Option<NamedTempFile>,
}

impl WorkingFile {
    /// Create new working file next to target file.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if file cannot be created.
    pub fn create_for(target: &TargetFile) -> io::Result<Self> {
        let mut prefix = String::from(".");
        if let Some(name) = target.path().file_name() {
            prefix.push_str(&name.to_string_lossy());
            prefix.push('.');
        }

        let file = Builder::new()
            .prefix(&prefix)
            .suffix(&format!(".{WORKING_EXTENSION}"))
            .tempfile_in(target.directory())?;
        register(file.path());
        debug!("created working file {:?}", file.path().display());

        Ok(Self { file: Some(file) })
    }

    /// Path to working file.
    pub fn path(&self) -> &Path {
        self.file
            .as_ref()
            .map(NamedTempFile::path)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Write full content and flush it to disk.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if content cannot be written or synced.
    pub fn write_all(&mut self, content: &[u8]) -> io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(io::Error::other("working file already persisted"));
        };
        file.write_all(content)?;
        file.as_file().sync_all()
    }

    /// Atomically rename working file onto destination path.
    ///
    /// The working file is removed when the rename fails.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if rename fails.
    pub fn persist(mut self, dest: impl AsRef<Path>) -> io::Result<()> {
        let Some(file) = self.file.take() else {
            return Err(io::Error::other("working file already persisted"));
        };
        let path = file.path().to_path_buf();

        let result = file.persist(dest.as_ref());
        let result = match result {
            Ok(_) => Ok(()),
            Err(PersistError { error, file }) => {
                drop(file);
                Err(error)
            }
        };
        deregister(&path);

        result
    }
}

impl Drop for WorkingFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            match file.close() {
                Err(error) if error.kind() != io::ErrorKind::NotFound => {
                    warn!("failed to remove working file {:?}: {error}", path.display());
                }
                _ => {}
            }
            deregister(&path);
        }
    }
}

/// Remove working files left behind when the process receives a
/// termination signal.
///
/// Spawns a listener thread for SIGTERM, SIGINT, SIGQUIT, and SIGHUP. On the
/// first signal every registered working file is removed, and the process
/// exits with status `128 + signal`.
///
/// # Errors
///
/// - Return [`io::Error`] if signal handlers cannot be installed.
pub fn install_signal_cleanup() -> io::Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])?;
    thread::Builder::new()
        .name("signal-cleanup".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                warn!("received signal {signal}, removing working files");
                remove_registered();
                process::exit(128 + signal);
            }
        })?;

    Ok(())
}

/// Paths of working files currently alive.
pub fn registered() -> Vec<PathBuf> {
    REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn register(path: &Path) {
    REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(path.to_path_buf());
}

fn deregister(path: &Path) {
    REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .retain(|entry| entry != path);
}

fn remove_registered() {
    let mut registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    for path in registry.drain(..) {
        match fs::remove_file(&path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!("failed to remove working file {:?}: {error}", path.display());
            }
            _ => {}
        }
    }
}
