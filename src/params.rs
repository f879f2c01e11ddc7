// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Parameter discovery.
//!
//! List the names of every variable a set of target files refers to, so
//! operators can find out what a container expects in its environment. Uses
//! the same source precedence as patching, i.e., the failsafe backup is read
//! in favour of an already patched primary file. Escapes are not parameters.
//! Nothing is ever written.

use crate::{
    patch::target::{Access, TargetError, TargetFile},
    template::references,
};

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
};
use tracing::{debug, instrument};

/// Sorted set of referenced variable names.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Parameters(BTreeSet<String>);

impl Parameters {
    /// Construct new empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect referenced variables of all target files.
    ///
    /// # Errors
    ///
    /// - Return [`TargetError`] if any target is missing or unreadable.
    #[instrument(skip(targets), level = "debug")]
    pub fn collect(targets: &[TargetFile]) -> Result<Self, TargetError> {
        for target in targets {
            target.validate(Access::Read)?;
        }

        let mut parameters = Self::new();
        for target in targets {
            let source = target.source();
            debug!("scan {:?} for parameters", source.path.display());
            parameters.extend_from(&source.read()?);
        }

        Ok(parameters)
    }

    /// Add every referenced variable of a text.
    pub fn extend_from(&mut self, content: &(impl AsRef<[u8]> + ?Sized)) {
        self.0.extend(references(content.as_ref()).map(str::to_owned));
    }

    /// Iterate over names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no names were found.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Parameters {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for name in self.iter() {
            writeln!(fmt, "{name}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs;

    #[test]
    fn parameters_dedup_and_skip_escapes() {
        let mut parameters = Parameters::new();
        parameters.extend_from("${A}\n$${B}\n${A}\n");
        assert_eq!(parameters.to_string(), "A\n");
    }

    #[sealed_test]
    fn collect_across_files_sorted() -> anyhow::Result<()> {
        fs::write(
            "web.conf",
            indoc! {r#"
                listen ${PORT};
                server_name ${HOST};
                set $$${literal};
            "#},
        )?;
        fs::write("app.ini", "db=${DB_URL}\nport=${PORT}\n")?;

        let targets = [TargetFile::new("web.conf"), TargetFile::new("app.ini")];
        let result = Parameters::collect(&targets)?;
        let expect = indoc! {r#"
            DB_URL
            HOST
            PORT
        "#};
        assert_eq!(result.to_string(), expect);
        assert_eq!(fs::read_dir(".")?.count(), 2);

        Ok(())
    }

    #[sealed_test]
    fn collect_reads_failsafe_backup() -> anyhow::Result<()> {
        fs::write("app.conf", "port=8080\n")?;
        fs::write("app.conf.debk", "port=${PORT}\n")?;

        let result = Parameters::collect(&[TargetFile::new("app.conf")])?;
        assert_eq!(result.iter().collect::<Vec<_>>(), vec!["PORT"]);

        Ok(())
    }
}
