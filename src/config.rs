// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the __deploy definition__, the TOML file describing
//! what a single invocation of deploy-env should do. File I/O is left to the
//! caller to figure out.
//!
//! # General Layout
//!
//! ```toml
//! strict = true
//! user = "www-data"
//! allow = ["DB_HOST", "DB_PORT"]
//! files = ["/etc/nginx/conf.d/*.conf", "~/app.ini"]
//! command = ["nginx", "-g", "daemon off;"]
//!
//! [define]
//! LISTEN_PORT = "8080"
//! ```
//!
//! Every field is optional. Entries of `files` are shell expanded, so `~` and
//! `$VAR` work, and may be glob patterns.

use crate::patch::target::TargetFile;

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};
use tracing::debug;

const REDACTED: &str = "<redacted>";

/// Deploy definition layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployDefinition {
    /// Abort on undefined variables.
    pub strict: bool,

    /// User to run command as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Restrict environment to these variable names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,

    /// Target files or glob patterns.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Command to launch after patching.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Explicit variable definitions, overriding the environment.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub define: BTreeMap<String, String>,
}

impl DeployDefinition {
    /// Layer another definition on top of this one.
    ///
    /// Scalars of `other` win when set, lists are appended, definitions of
    /// `other` replace ours, and a non-empty command replaces ours.
    pub fn merge(&mut self, other: DeployDefinition) {
        self.strict |= other.strict;
        if other.user.is_some() {
            self.user = other.user;
        }
        self.allow.extend(other.allow);
        self.files.extend(other.files);
        if !other.command.is_empty() {
            self.command = other.command;
        }
        self.define.extend(other.define);
    }

    /// Copy of definition with variable values masked, safe to log.
    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        for value in redacted.define.values_mut() {
            *value = REDACTED.into();
        }
        redacted
    }

    /// Expand file patterns into target files.
    ///
    /// Patterns are expanded in order, and so are their matches. A pattern
    /// that matches nothing is kept as a literal path, so that validation
    /// reports it as missing. Failsafe backups, save files, and working files
    /// are never targets, so matches naming them are skipped. Duplicate
    /// targets are dropped, keeping their first occurrence.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Pattern`] if a glob pattern is malformed.
    /// - Return [`ConfigError::Glob`] if a match cannot be read.
    pub fn targets(&self) -> Result<Vec<TargetFile>> {
        let mut targets: Vec<TargetFile> = Vec::new();
        for pattern in &self.files {
            let mut matches = Vec::new();
            let mut matched = false;
            for entry in glob::glob(pattern)? {
                let path = entry?;
                matched = true;
                if TargetFile::is_artifact(&path) {
                    debug!("skip backup artifact {:?}", path.display());
                    continue;
                }
                matches.push(path);
            }

            if !matched {
                matches.push(PathBuf::from(pattern));
            }

            for path in matches {
                let target = TargetFile::new(path);
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }

        Ok(targets)
    }
}

impl FromStr for DeployDefinition {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut definition: DeployDefinition =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on file patterns.
        definition.files = definition
            .files
            .iter()
            .map(|pattern| shellexpand::full(pattern).map(|expanded| expanded.into_owned()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ConfigError::ShellExpansion)?;

        Ok(definition)
    }
}

impl Display for DeployDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// File pattern is not a valid glob.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// File pattern match cannot be read.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs;

    #[sealed_test(env = [("CONF_DIR", "/etc/app")])]
    fn deserialize_deploy_definition() -> anyhow::Result<()> {
        let result: DeployDefinition = r#"
            strict = true
            user = "www-data"
            allow = ["DB_HOST", "DB_PORT"]
            files = ["$CONF_DIR/app.ini", "/etc/nginx/*.conf"]
            command = ["nginx", "-g", "daemon off;"]

            [define]
            LISTEN_PORT = "8080"
        "#
        .parse()?;

        let expect = DeployDefinition {
            strict: true,
            user: Some("www-data".into()),
            allow: vec!["DB_HOST".into(), "DB_PORT".into()],
            files: vec!["/etc/app/app.ini".into(), "/etc/nginx/*.conf".into()],
            command: vec!["nginx".into(), "-g".into(), "daemon off;".into()],
            define: BTreeMap::from([("LISTEN_PORT".into(), "8080".into())]),
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_rejects_unknown_fields() {
        let result = "stict = true".parse::<DeployDefinition>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn serialize_deploy_definition() {
        let result = DeployDefinition {
            strict: true,
            user: None,
            allow: vec![],
            files: vec!["/etc/app/app.ini".into()],
            command: vec!["app".into()],
            define: BTreeMap::from([("PORT".into(), "80".into())]),
        }
        .to_string();

        let expect = indoc! {r#"
            strict = true
            files = ["/etc/app/app.ini"]
            command = ["app"]

            [define]
            PORT = "80"
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn merge_layers_definitions() {
        let mut base = DeployDefinition {
            strict: false,
            user: Some("app".into()),
            allow: vec!["HOST".into()],
            files: vec!["a.conf".into()],
            command: vec!["app".into(), "--serve".into()],
            define: BTreeMap::from([("PORT".into(), "80".into())]),
        };

        base.merge(DeployDefinition {
            strict: true,
            files: vec!["b.conf".into()],
            define: BTreeMap::from([("PORT".into(), "8080".into())]),
            ..DeployDefinition::default()
        });

        let expect = DeployDefinition {
            strict: true,
            user: Some("app".into()),
            allow: vec!["HOST".into()],
            files: vec!["a.conf".into(), "b.conf".into()],
            command: vec!["app".into(), "--serve".into()],
            define: BTreeMap::from([("PORT".into(), "8080".into())]),
        };
        assert_eq!(base, expect);
    }

    #[sealed_test]
    fn targets_expand_globs_in_order() -> anyhow::Result<()> {
        fs::create_dir("conf.d")?;
        fs::write("conf.d/b.conf", "")?;
        fs::write("conf.d/a.conf", "")?;
        fs::write("main.conf", "")?;

        let definition = DeployDefinition {
            files: vec![
                "main.conf".into(),
                "conf.d/*.conf".into(),
                "main.conf".into(),
                "missing.conf".into(),
            ],
            ..DeployDefinition::default()
        };

        let result = definition.targets()?;
        let expect = vec![
            TargetFile::new("main.conf"),
            TargetFile::new("conf.d/a.conf"),
            TargetFile::new("conf.d/b.conf"),
            TargetFile::new("missing.conf"),
        ];
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test]
    fn targets_skip_backup_artifacts() -> anyhow::Result<()> {
        for name in [
            "app.conf",
            "app.conf.debk",
            "app.conf.save.0",
            "app.conf.save.3",
            ".app.conf.a1B2c3.deploy-env",
            "other.ini",
        ] {
            fs::write(name, "")?;
        }

        let definition = DeployDefinition {
            files: vec!["*".into(), "app.conf.debk".into()],
            ..DeployDefinition::default()
        };

        let result = definition.targets()?;
        let expect = vec![TargetFile::new("app.conf"), TargetFile::new("other.ini")];
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn redacted_masks_variable_values() {
        let definition = DeployDefinition {
            files: vec!["/etc/app/app.ini".into()],
            define: BTreeMap::from([("DB_PASSWORD".into(), "hunter2".into())]),
            ..DeployDefinition::default()
        };

        let result = definition.redacted().to_string();
        assert!(result.contains("DB_PASSWORD"));
        assert!(result.contains("/etc/app/app.ini"));
        assert!(!result.contains("hunter2"));
        assert_eq!(definition.define["DB_PASSWORD"], "hunter2");
    }
}
