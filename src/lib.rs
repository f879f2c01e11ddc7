// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration patching for container entry points.
//!
//! Container images often ship configuration files as __templates__ that
//! refer to environment variables through `${NAME}` placeholders. Right
//! before the container's actual command starts, deploy-env substitutes
//! those placeholders with values from the environment, and then replaces
//! itself with that command.
//!
//! # Idempotent Patching
//!
//! Containers restart, so patching must be safe to repeat. The first patch of
//! a file keeps its pristine template as a __failsafe backup__ next to it.
//! Every later patch starts over from that backup instead of the already
//! patched file, so a restart with a different environment yields a correct
//! fresh result. Replaced content is kept in rotating __save files__.
//!
//! # See Also
//!
//! 1. [`template`] for placeholder syntax.
//! 2. [`patch`] for the commit protocol and backup lifecycle.

pub mod config;
pub mod deploy;
pub mod env;
pub mod launch;
pub mod params;
pub mod patch;
pub mod path;
pub mod template;

pub use config::DeployDefinition;
pub use deploy::{Deployment, Mode};
pub use env::{Resolve, VariableMap};
pub use launch::{ExecLauncher, Launch, LaunchSpec, TargetUser};
pub use params::Parameters;
pub use patch::{target::TargetFile, working::install_signal_cleanup, Patcher, Policy};
