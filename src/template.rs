// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Placeholder substitution.
//!
//! Configuration templates mark substitution points with `${name}`, where
//! `name` matches `[A-Za-z_][A-Za-z_0-9]*`. A placeholder preceded by an
//! extra dollar sign, `$${name}`, is an __escape__ that produces the literal
//! text `${name}` without consulting any variable. There is no nesting and no
//! default-value syntax.
//!
//! # Substitution Rules
//!
//! - Defined reference: replaced by its value, even if the value is empty.
//! - Undefined reference: left verbatim, and reported as missing.
//! - Escape: one dollar sign removed, never looked up.
//!
//! Any substitution or escape counts as a modification of the line. Text
//! outside of placeholders is passed through byte for byte, line terminators
//! included, whatever its encoding. Values are inserted as-is and never
//! scanned again.

pub mod scan;

use crate::{
    env::Resolve,
    template::scan::{PlaceholderKind, Placeholders},
};

/// Result of patching one line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinePatch {
    /// Patched text.
    pub text: Vec<u8>,

    /// Line changed through substitution or escape removal.
    pub modified: bool,

    /// Names of undefined references, left to right.
    pub missing: Vec<String>,
}

/// Patch a single line.
///
/// Placeholders are processed right to left, so each replacement leaves the
/// offsets of the not-yet-processed text on its left intact.
pub fn patch_line(line: &[u8], resolver: &impl Resolve) -> LinePatch {
    let mut text = line.to_vec();
    let mut modified = false;
    let mut missing = Vec::new();

    for placeholder in Placeholders::new(line) {
        match placeholder.kind {
            PlaceholderKind::Escape => {
                text.splice(placeholder.span.clone(), placeholder.literal().into_bytes());
                modified = true;
            }
            PlaceholderKind::Reference => match resolver.resolve(placeholder.name) {
                Some(value) => {
                    text.splice(placeholder.span, value.bytes());
                    modified = true;
                }
                None => missing.push(placeholder.name.to_owned()),
            },
        }
    }

    missing.reverse();
    LinePatch {
        text,
        modified,
        missing,
    }
}

/// Undefined reference found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingVariable {
    /// Name of the variable.
    pub name: String,

    /// One-based line number of the reference.
    pub line: usize,
}

/// Result of patching a whole text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextPatch {
    pub content: Vec<u8>,
    pub modified: bool,
    pub missing: Vec<MissingVariable>,
}

/// Patch every line of a text, folding the per-line results.
pub fn patch_text(content: &[u8], resolver: &impl Resolve) -> TextPatch {
    let mut patch = TextPatch {
        content: Vec::with_capacity(content.len()),
        ..TextPatch::default()
    };

    for (index, line) in content.split_inclusive(|byte| *byte == b'\n').enumerate() {
        let LinePatch {
            text,
            modified,
            missing,
        } = patch_line(line, resolver);
        patch.content.extend_from_slice(&text);
        patch.modified |= modified;
        patch
            .missing
            .extend(missing.into_iter().map(|name| MissingVariable {
                name,
                line: index + 1,
            }));
    }

    patch
}

/// Iterate over the names of every non-escaped reference in a text.
pub fn references(content: &[u8]) -> impl Iterator<Item = &str> {
    content.split(|byte| *byte == b'\n').flat_map(|line| {
        Placeholders::new(line)
            .filter(|placeholder| !placeholder.is_escape())
            .map(|placeholder| placeholder.name)
    })
}
