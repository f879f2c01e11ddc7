// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment driver.
//!
//! A __deployment__ is one invocation of deploy-env: patch (or list the
//! parameters of) a set of target files, then hand the process over to the
//! container's actual command. Everything that can be checked up front, e.g.,
//! variable definitions and the target user, is checked while building the
//! deployment, i.e., before any file is touched.

use crate::{
    config::DeployDefinition,
    env::VariableMap,
    launch::{Launch, LaunchSpec, TargetUser},
    params::Parameters,
    patch::{target::TargetFile, Patcher, Policy},
};

use std::{ffi::OsString, io::Write};
use tracing::{debug, info, instrument, warn};

/// What to do with target files.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Substitute placeholders and commit results.
    #[default]
    Patch,

    /// Only list referenced variables.
    ListParams,
}

/// Single invocation of deploy-env.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub targets: Vec<TargetFile>,
    pub variables: VariableMap,
    pub policy: Policy,
    pub mode: Mode,
    pub launch: Option<LaunchSpec>,
}

impl Deployment {
    /// Build deployment from deploy definition.
    ///
    /// The environment is narrowed to the allow-list of the definition, if
    /// any, and then overlaid with the explicit definitions. The command of
    /// the definition is used unless `command` is non-empty.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError::Config`] if file patterns cannot be expanded.
    /// - Return [`DeployError::Variable`] if a definition has a bad name.
    /// - Return [`DeployError::Launch`] if target user does not exist.
    pub fn from_definition(
        definition: DeployDefinition,
        mode: Mode,
        command: Vec<OsString>,
        mut environment: VariableMap,
    ) -> Result<Self> {
        let targets = definition.targets()?;

        if !definition.allow.is_empty() {
            environment.retain_allowed(&definition.allow);
        }
        for (name, value) in definition.define {
            environment.define(name, value)?;
        }

        let command = if command.is_empty() {
            definition.command.into_iter().map(OsString::from).collect()
        } else {
            command
        };

        let launch = match (LaunchSpec::from_command(command), definition.user) {
            (Some(spec), Some(user)) => Some(spec.with_user(TargetUser::lookup(user)?)),
            (Some(spec), None) => Some(spec),
            (None, Some(user)) => {
                warn!("no command to launch, ignoring user {user:?}");
                None
            }
            (None, None) => None,
        };

        let policy = if definition.strict {
            Policy::Strict
        } else {
            Policy::Lenient
        };

        Ok(Self {
            targets,
            variables: environment,
            policy,
            mode,
            launch,
        })
    }

    /// Run deployment.
    ///
    /// Parameter listings are written to `out`, which is flushed before the
    /// command is launched.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError::Patch`] if patching fails.
    /// - Return [`DeployError::Target`] if listing fails.
    /// - Return [`DeployError::Output`] if listing cannot be written.
    /// - Return [`DeployError::Launch`] if command cannot be launched.
    #[instrument(skip(self, launcher, out), level = "debug")]
    pub fn run(&self, launcher: &impl Launch, out: &mut impl Write) -> Result<()> {
        debug!(
            "{} target file(s), {} variable(s) available",
            self.targets.len(),
            self.variables.len()
        );

        match self.mode {
            Mode::Patch if self.targets.is_empty() => info!("no target files to patch"),
            Mode::Patch => {
                let summary = Patcher::new(&self.variables, self.policy).patch_all(&self.targets)?;
                info!(
                    "patched {} of {} file(s), {} undefined reference(s)",
                    summary.committed(),
                    self.targets.len(),
                    summary.missing()
                );
            }
            Mode::ListParams => {
                let parameters = Parameters::collect(&self.targets)?;
                write!(out, "{parameters}")?;
                out.flush()?;
            }
        }

        if let Some(spec) = &self.launch {
            launcher.launch(spec)?;
        }

        Ok(())
    }
}

/// Deployment error types.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Deploy definition cannot be applied.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Variable definition is invalid.
    #[error(transparent)]
    Variable(#[from] crate::env::VariableError),

    /// Target file cannot be used.
    #[error(transparent)]
    Target(#[from] crate::patch::target::TargetError),

    /// Patch run fails.
    #[error(transparent)]
    Patch(#[from] crate::patch::PatchError),

    /// Command cannot be launched.
    #[error(transparent)]
    Launch(#[from] crate::launch::LaunchError),

    /// Parameter listing cannot be written.
    #[error("failed to write parameter listing")]
    Output(#[from] std::io::Error),
}

/// Friendly result alias :3
type Result<T, E = DeployError> = std::result::Result<T, E>;
