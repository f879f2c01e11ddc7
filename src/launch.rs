// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Command launch.
//!
//! Once all target files are in place, the current process is replaced by the
//! command the container is actually meant to run. Replacement is terminal:
//! on success control never comes back. The command may run as a different
//! user, which requires the process to be running as root. Without that
//! privilege the command runs as the current user, and a warning is logged.

use nix::unistd::{geteuid, getuid, setgid, setuid, Gid, Uid, User};
use std::{
    ffi::{OsStr, OsString},
    os::unix::process::CommandExt,
    path::PathBuf,
    process::Command,
};
use tracing::{info, instrument, warn};

/// Command to replace the current process with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program to execute, resolved through `PATH` when relative.
    pub program: OsString,

    /// Arguments passed to program.
    pub args: Vec<OsString>,

    /// User to run program as.
    pub user: Option<TargetUser>,
}

impl LaunchSpec {
    /// Construct launch specification from a command line.
    ///
    /// Return [`None`] for an empty command line.
    pub fn from_command(command: impl IntoIterator<Item = impl Into<OsString>>) -> Option<Self> {
        let mut command = command.into_iter().map(Into::into);
        let program = command.next()?;

        Some(Self {
            program,
            args: command.collect(),
            user: None,
        })
    }

    /// Run program as target user.
    pub fn with_user(mut self, user: TargetUser) -> Self {
        self.user = Some(user);
        self
    }
}

/// User account a command is launched as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUser {
    pub name: String,
    pub uid: Uid,
    pub gid: Gid,
    pub home: PathBuf,
}

impl TargetUser {
    /// Look up user account by name or numeric uid.
    ///
    /// # Errors
    ///
    /// - Return [`LaunchError::UnknownUser`] if no such account exists.
    /// - Return [`LaunchError::UserLookup`] if account database cannot be
    ///   queried.
    pub fn lookup(user: impl AsRef<str>) -> Result<Self> {
        let user = user.as_ref();
        let lookup = match user.parse::<u32>() {
            Ok(uid) => User::from_uid(Uid::from_raw(uid)),
            Err(_) => User::from_name(user),
        };

        let account = lookup
            .map_err(|err| LaunchError::UserLookup {
                source: err,
                user: user.to_owned(),
            })?
            .ok_or_else(|| LaunchError::UnknownUser(user.to_owned()))?;

        Ok(Self::from(account))
    }
}

impl From<User> for TargetUser {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            uid: user.uid,
            gid: user.gid,
            home: user.dir,
        }
    }
}

/// Replace current process with a command.
pub trait Launch {
    /// Launch command described by launch specification.
    ///
    /// Implementations that replace the process never return on success.
    ///
    /// # Errors
    ///
    /// - Return [`LaunchError`] if command cannot be started.
    fn launch(&self, spec: &LaunchSpec) -> Result<()>;
}

/// Launch commands through `execvp(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecLauncher;

impl Launch for ExecLauncher {
    #[instrument(skip(self, spec), level = "debug")]
    fn launch(&self, spec: &LaunchSpec) -> Result<()> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);

        if let Some(user) = &spec.user {
            if geteuid().is_root() {
                switch_user(user)?;
                command
                    .env("HOME", &user.home)
                    .env("USER", &user.name)
                    .env("LOGNAME", &user.name);
            } else if getuid() != user.uid {
                warn!(
                    "not running as root, cannot switch to user {:?}, launching as current user",
                    user.name
                );
            }
        }

        info!("launch {}", display_command(&spec.program, &spec.args));
        let error = command.exec();

        Err(LaunchError::Exec {
            source: error,
            program: spec.program.clone(),
        })
    }
}

/// Drop privileges to target user.
///
/// Supplementary groups go first, then the group id, then the user id, since
/// each step needs the privilege the next one gives up.
fn switch_user(user: &TargetUser) -> Result<()> {
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    {
        let name = std::ffi::CString::new(user.name.as_str())
            .map_err(|_| LaunchError::UnknownUser(user.name.clone()))?;
        nix::unistd::initgroups(&name, user.gid).map_err(|err| LaunchError::SwitchUser {
            source: err,
            user: user.name.clone(),
        })?;
    }

    setgid(user.gid).map_err(|err| LaunchError::SwitchUser {
        source: err,
        user: user.name.clone(),
    })?;
    setuid(user.uid).map_err(|err| LaunchError::SwitchUser {
        source: err,
        user: user.name.clone(),
    })?;

    Ok(())
}

fn display_command(program: &OsStr, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Command launch error types.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// No account matches user name or uid.
    #[error("unknown user {0:?}")]
    UnknownUser(String),

    /// Account database lookup fails.
    #[error("failed to look up user {user:?}")]
    UserLookup {
        #[source]
        source: nix::errno::Errno,
        user: String,
    },

    /// Switching identity to target user fails.
    #[error("failed to switch to user {user:?}")]
    SwitchUser {
        #[source]
        source: nix::errno::Errno,
        user: String,
    },

    /// Command cannot be executed.
    #[error("failed to launch {program:?}")]
    Exec {
        #[source]
        source: std::io::Error,
        program: OsString,
    },
}

/// Friendly result alias :3
type Result<T, E = LaunchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn launch_spec_from_command() {
        let result = LaunchSpec::from_command(["nginx", "-g", "daemon off;"]);
        let expect = LaunchSpec {
            program: "nginx".into(),
            args: vec!["-g".into(), "daemon off;".into()],
            user: None,
        };
        assert_eq!(result, Some(expect));

        let empty: [&str; 0] = [];
        assert_eq!(LaunchSpec::from_command(empty), None);
    }

    #[test]
    fn lookup_root_by_name_and_uid() -> anyhow::Result<()> {
        let by_name = TargetUser::lookup("root")?;
        let by_uid = TargetUser::lookup("0")?;
        assert_eq!(by_name, by_uid);
        assert!(by_name.uid.is_root());

        Ok(())
    }

    #[test]
    fn lookup_unknown_user() {
        let result = TargetUser::lookup("no-such-user-deploy-env");
        assert!(matches!(result, Err(LaunchError::UnknownUser(_))));
    }

    #[test]
    fn exec_failure_is_reported() {
        let spec = LaunchSpec::from_command(["/nonexistent/deploy-env-test-binary"]);
        let result = ExecLauncher.launch(&spec.unwrap());
        assert!(matches!(result, Err(LaunchError::Exec { .. })));
    }

    #[test]
    fn display_command_joins_arguments() {
        let result = display_command(OsStr::new("nginx"), &["-g".into(), "daemon off;".into()]);
        assert_eq!(result, "nginx -g daemon off;");
    }
}
