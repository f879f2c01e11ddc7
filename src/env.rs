// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Variable resolution.
//!
//! Placeholders are resolved against a [`VariableMap`], which is built once
//! per invocation from the process environment. The environment can be
//! narrowed to an allow-list of names, and explicit `NAME=VALUE` definitions
//! can be layered on top of it. The map is never modified while files are
//! being patched.

use crate::template::scan::is_identifier;

use std::{
    collections::{btree_map, BTreeMap},
    ffi::OsString,
    str::FromStr,
};

/// Resolve variable names to values.
pub trait Resolve {
    /// Look up value of variable by name.
    ///
    /// An empty string is a valid value. Only [`None`] means the variable is
    /// undefined.
    fn resolve(&self, name: &str) -> Option<&str>;
}

/// Mapping of variable names to their values.
///
/// # Invariant
///
/// - Every name is a valid identifier.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VariableMap(BTreeMap<String, String>);

impl VariableMap {
    /// Construct new empty variable map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    /// Build variable map from raw environment entries.
    ///
    /// Entries that are not UTF-8, or whose name is not a valid identifier,
    /// can never be referenced by a placeholder, so they are skipped.
    pub fn from_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        let map = vars
            .into_iter()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .filter(|(name, _)| is_identifier(name))
            .collect();

        Self(map)
    }

    /// Keep only variables whose name appears in the allow-list.
    pub fn retain_allowed(&mut self, allow: impl IntoIterator<Item = impl AsRef<str>>) {
        let allow = allow
            .into_iter()
            .map(|name| name.as_ref().to_owned())
            .collect::<Vec<_>>();
        self.0.retain(|name, _| allow.contains(name));
    }

    /// Define variable, replacing any previous value.
    ///
    /// # Errors
    ///
    /// - Return [`VariableError::InvalidName`] if name is not an identifier.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(VariableError::InvalidName(name));
        }

        self.0.insert(name, value.into());
        Ok(())
    }

    /// Get value of variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Number of defined variables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no variables are defined.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over variables sorted by name.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

impl Resolve for VariableMap {
    fn resolve(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

impl<K, V> FromIterator<(K, V)> for VariableMap
where
    K: Into<String>,
    V: Into<String>,
{
    /// Collect name and value pairs. Invalid names are dropped.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = iter
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .filter(|(name, _)| is_identifier(name))
            .collect();

        Self(map)
    }
}

/// Explicit `NAME=VALUE` variable definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub value: String,
}

impl FromStr for Definition {
    type Err = VariableError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let (name, value) = data
            .split_once('=')
            .ok_or_else(|| VariableError::InvalidDefinition(data.to_owned()))?;

        if !is_identifier(name) {
            return Err(VariableError::InvalidName(name.to_owned()));
        }

        Ok(Self {
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }
}

/// Variable handling error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VariableError {
    /// Name does not match `[A-Za-z_][A-Za-z_0-9]*`.
    #[error("invalid variable name {0:?}")]
    InvalidName(String),

    /// Definition is not of the form `NAME=VALUE`.
    #[error("invalid variable definition {0:?}, expected NAME=VALUE")]
    InvalidDefinition(String),
}

/// Friendly result alias :3
type Result<T, E = VariableError> = std::result::Result<T, E>;
