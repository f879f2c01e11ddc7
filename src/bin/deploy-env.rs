// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use deploy_env::{
    env::Definition, install_signal_cleanup, path::default_definition_path, DeployDefinition,
    Deployment, ExecLauncher, Mode, VariableMap,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::{
    ffi::OsString,
    fs::read_to_string,
    io::{self, stderr},
    path::PathBuf,
    process::exit,
};
use tracing::{debug, error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Patch configuration templates with environment variables, then launch a
/// command.
#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "deploy-env [options] [--] [command [args]...]",
    version
)]
struct Cli {
    /// Path to deploy definition.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Target file to patch, in addition to those of the deploy definition.
    #[arg(short, long = "file", value_name = "path")]
    pub files: Vec<String>,

    /// Abort without committing anything if a variable is undefined.
    #[arg(short, long)]
    pub strict: bool,

    /// List referenced variables instead of patching.
    #[arg(short, long)]
    pub list_params: bool,

    /// Run command as this user, by name or uid.
    #[arg(short, long, value_name = "user")]
    pub user: Option<String>,

    /// Restrict environment to these variables.
    #[arg(short, long, value_name = "name")]
    pub allow: Vec<String>,

    /// Define variable, overriding the environment.
    #[arg(short = 'D', long, value_name = "NAME=VALUE")]
    pub define: Vec<Definition>,

    /// Increase logging verbosity.
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Command to launch after patching.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "command")]
    pub command: Vec<OsString>,
}

impl Cli {
    fn level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }

    fn definition(&self) -> Result<DeployDefinition> {
        let path = match &self.config {
            Some(path) => Some(path.clone()),
            None => default_definition_path()
                .ok()
                .filter(|path| path.is_file()),
        };

        let mut definition = match path {
            Some(path) => {
                debug!("load deploy definition {:?}", path.display());
                read_to_string(&path)
                    .with_context(|| format!("failed to read {:?}", path.display()))?
                    .parse::<DeployDefinition>()
                    .with_context(|| format!("invalid deploy definition {:?}", path.display()))?
            }
            None => DeployDefinition::default(),
        };

        definition.merge(DeployDefinition {
            strict: self.strict,
            user: self.user.clone(),
            allow: self.allow.clone(),
            files: self.files.clone(),
            command: Vec::new(),
            define: self
                .define
                .iter()
                .map(|definition| (definition.name.clone(), definition.value.clone()))
                .collect(),
        });

        Ok(definition)
    }

    fn run(self) -> Result<()> {
        let definition = self.definition()?;
        debug!("effective deploy definition:\n{}", definition.redacted());

        let mode = if self.list_params {
            Mode::ListParams
        } else {
            Mode::Patch
        };

        let deployment =
            Deployment::from_definition(definition, mode, self.command, VariableMap::from_env())?;
        deployment.run(&ExecLauncher, &mut io::stdout().lock())?;

        Ok(())
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            exit(if error.use_stderr() { 1 } else { 0 });
        }
    };

    let layer = fmt::layer()
        .compact()
        .with_writer(stderr)
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.level()));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = install_signal_cleanup() {
        warn!("cannot install signal cleanup: {error}");
    }

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}
