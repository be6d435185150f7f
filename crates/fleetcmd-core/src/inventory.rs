//! Host inventory: one `<host> <login>` pair per line

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One host to process, with the login to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Hostname or IP address
    pub host: String,
    /// SSH login
    pub login: String,
}

impl InventoryEntry {
    pub fn new(host: impl Into<String>, login: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            login: login.into(),
        }
    }
}

impl fmt::Display for InventoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.login, self.host)
    }
}

/// An inventory line that did not produce an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    /// 1-based line number
    pub line: usize,
    /// Line text as written (trimmed)
    pub content: String,
    /// Number of whitespace-separated tokens found
    pub tokens: usize,
}

impl fmt::Display for SkippedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: expected `<host> <login>`, found {} token(s): {}",
            self.line, self.tokens, self.content
        )
    }
}

/// Parsed inventory: valid entries in file order plus skipped lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: Vec<InventoryEntry>,
    skipped: Vec<SkippedLine>,
}

impl Inventory {
    /// Parse inventory lines
    ///
    /// Blank lines are ignored. Lines that are not exactly two tokens are skipped with a
    /// warning; they never fail the parse.
    pub fn parse<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inventory = Self::default();

        for (idx, line) in lines.into_iter().enumerate() {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if let [host, login] = tokens.as_slice() {
                inventory.entries.push(InventoryEntry::new(*host, *login));
            } else {
                let skipped = SkippedLine {
                    line: idx + 1,
                    content: line.to_string(),
                    tokens: tokens.len(),
                };
                warn!(
                    line = skipped.line,
                    content = %skipped.content,
                    "skipping invalid inventory line"
                );
                inventory.skipped.push(skipped);
            }
        }

        inventory
    }

    /// Read and parse an inventory file
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(content.lines()))
    }

    #[must_use]
    pub fn entries(&self) -> &[InventoryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn skipped(&self) -> &[SkippedLine] {
        &self.skipped
    }
}

impl FromIterator<InventoryEntry> for Inventory {
    fn from_iter<T: IntoIterator<Item = InventoryEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            skipped: Vec::new(),
        }
    }
}
