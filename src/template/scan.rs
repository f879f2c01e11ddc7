// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Placeholder scanning.
//!
//! Locate `${name}` references and `$${name}` escapes inside a single line of
//! text. Scanning runs from the end of the line towards its start, so every
//! span handed out refers to text that has not been touched yet. Callers can
//! therefore replace each span in place without invalidating the offsets of
//! the placeholders still waiting to be scanned to the left of it.
//!
//! Lines are scanned as raw bytes. Placeholders are pure ASCII, so text in
//! any other encoding around them passes through untouched.

use std::ops::Range;

/// Kind of placeholder found by [`Placeholders`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// Plain `${name}` reference that should be resolved.
    Reference,

    /// Escaped `$${name}` that expands to the literal text `${name}`.
    Escape,
}

/// A single placeholder occurrence inside a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Reference or escape.
    pub kind: PlaceholderKind,

    /// Identifier between the braces.
    pub name: &'a str,

    /// Byte span of the whole occurrence, escape marker included.
    pub span: Range<usize>,
}

impl Placeholder<'_> {
    /// Check if placeholder is an escape.
    pub fn is_escape(&self) -> bool {
        self.kind == PlaceholderKind::Escape
    }

    /// Literal `${name}` form of placeholder.
    pub fn literal(&self) -> String {
        format!("${{{}}}", self.name)
    }
}

/// Right-to-left iterator over the placeholders of a line.
///
/// Text that starts like a placeholder but lacks a valid identifier or the
/// closing brace is skipped as ordinary text.
#[derive(Debug, Clone)]
pub struct Placeholders<'a> {
    line: &'a [u8],
    end: usize,
}

impl<'a> Placeholders<'a> {
    /// Construct new scanner over target line.
    pub fn new<T>(line: &'a T) -> Self
    where
        T: AsRef<[u8]> + ?Sized,
    {
        let line = line.as_ref();
        Self {
            line,
            end: line.len(),
        }
    }
}

impl<'a> Iterator for Placeholders<'a> {
    type Item = Placeholder<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(open) = self.line[..self.end]
            .windows(2)
            .rposition(|pair| pair == b"${")
        {
            let rest = &self.line[open + 2..self.end];
            let len = identifier_len(rest);

            // INVARIANT: Only `${` + identifier + `}` counts as a placeholder.
            if len == 0 || rest.get(len) != Some(&b'}') {
                self.end = open;
                continue;
            }

            // Identifier bytes are ASCII, so this never fails.
            let Ok(name) = std::str::from_utf8(&rest[..len]) else {
                self.end = open;
                continue;
            };

            let close = open + 2 + len + 1;
            if open > 0 && self.line[open - 1] == b'$' {
                self.end = open - 1;
                return Some(Placeholder {
                    kind: PlaceholderKind::Escape,
                    name,
                    span: open - 1..close,
                });
            }

            self.end = open;
            return Some(Placeholder {
                kind: PlaceholderKind::Reference,
                name,
                span: open..close,
            });
        }

        self.end = 0;
        None
    }
}

/// Check that text is a valid variable identifier: `[A-Za-z_][A-Za-z_0-9]*`.
pub fn is_identifier(text: &str) -> bool {
    !text.is_empty() && identifier_len(text.as_bytes()) == text.len()
}

fn identifier_len(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(byte) if byte.is_ascii_alphabetic() || *byte == b'_' => {
            1 + bytes[1..]
                .iter()
                .take_while(|byte| byte.is_ascii_alphanumeric() || **byte == b'_')
                .count()
        }
        _ => 0,
    }
}
