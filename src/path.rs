// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where deploy-env looks for files it was not explicitly pointed
//! at.

use std::path::PathBuf;

/// Determine default absolute path to deploy definition.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/deploy-env/deploy.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_definition_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("deploy-env").join("deploy.toml"))
        .ok_or(NoConfigDir)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [("XDG_CONFIG_HOME", "/tmp/xdg-config")])]
    fn default_definition_path_follows_xdg() -> anyhow::Result<()> {
        let result = default_definition_path()?;
        let expect = PathBuf::from("/tmp/xdg-config/deploy-env/deploy.toml");
        assert_eq!(result, expect);

        Ok(())
    }
}
