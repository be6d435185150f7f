//! OS-keyed command library
//!
//! The definition format is plain text:
//!
//! ```text
//! [debian]
//! sudo apt update
//! sudo apt upgrade -y
//!
//! [rocky]
//! sudo dnf upgrade -y
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::LibraryError;
use crate::os::OsFamily;

/// Ordered command lists per known OS family
///
/// Every known family is present (possibly empty); lookups for `Unknown` yield an empty
/// slice, so lookup is total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLibrary {
    commands: BTreeMap<OsFamily, Vec<String>>,
}

impl Default for CommandLibrary {
    fn default() -> Self {
        Self {
            commands: OsFamily::KNOWN.into_iter().map(|f| (f, Vec::new())).collect(),
        }
    }
}

impl CommandLibrary {
    /// Parse a library definition
    ///
    /// Lines before the first section header and blank lines are ignored.
    ///
    /// # Errors
    /// Returns `LibraryError::UnknownSection` for a header that is not a known family.
    pub fn parse<I, S>(lines: I) -> Result<Self, LibraryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut library = Self::default();
        let mut current: Option<OsFamily> = None;

        for (idx, line) in lines.into_iter().enumerate() {
            let line = line.as_ref().trim();

            if let Some(name) = section_name(line) {
                let name = name.trim().to_lowercase();
                let family = OsFamily::from_section_name(&name).ok_or_else(|| {
                    LibraryError::UnknownSection {
                        line: idx + 1,
                        name,
                    }
                })?;
                current = Some(family);
            } else if !line.is_empty()
                && let Some(family) = current
            {
                library.push(family, line);
            }
        }

        debug!(
            debian = library.commands_for(OsFamily::Debian).len(),
            opensuse = library.commands_for(OsFamily::Opensuse).len(),
            rocky = library.commands_for(OsFamily::Rocky).len(),
            "parsed command library"
        );

        Ok(library)
    }

    /// Read and parse a library file
    ///
    /// # Errors
    /// Returns `LibraryError::Io` if the file cannot be read, or any parse error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| LibraryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Append a command to a family's list. Commands for `Unknown` are dropped.
    pub fn push(&mut self, family: OsFamily, command: impl Into<String>) {
        if let Some(list) = self.commands.get_mut(&family) {
            list.push(command.into());
        }
    }

    /// Commands for a family, in definition order
    #[must_use]
    pub fn commands_for(&self, family: OsFamily) -> &[String] {
        self.commands.get(&family).map_or(&[], Vec::as_slice)
    }

    /// Families present in the library, in canonical order
    pub fn families(&self) -> impl Iterator<Item = OsFamily> + '_ {
        self.commands.keys().copied()
    }

    /// Total number of commands across all families
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical definition text; parses back to an identical library
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

fn section_name(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']')
}

impl FromStr for CommandLibrary {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.lines())
    }
}

impl fmt::Display for CommandLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (family, commands)) in self.commands.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{family}]")?;
            for command in commands {
                writeln!(f, "{command}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_sections() {
        let text =
            "[debian]\nsudo apt update\nsudo apt upgrade -y\n\n[rocky]\nsudo dnf upgrade -y\n";
        let library: CommandLibrary = text.parse().unwrap();

        assert_eq!(library.families().count(), 3);
        assert_eq!(library.commands_for(OsFamily::Debian).len(), 2);
        assert_eq!(library.commands_for(OsFamily::Rocky), ["sudo dnf upgrade -y"]);
        assert!(library.commands_for(OsFamily::Opensuse).is_empty());
        assert!(library.commands_for(OsFamily::Unknown).is_empty());
    }

    #[test]
    fn test_preamble_and_blank_lines_ignored() {
        let lines = [
            "uptime",
            "",
            "  [ DEBIAN ]  ",
            "   ",
            "  df -h  ",
            "[OpenSUSE]",
            "zypper refresh",
        ];
        let library = CommandLibrary::parse(lines).unwrap();

        assert_eq!(library.commands_for(OsFamily::Debian), ["df -h"]);
        assert_eq!(library.commands_for(OsFamily::Opensuse), ["zypper refresh"]);
        assert_eq!(library.len(), 2);
    }

    #[test]
    fn test_unknown_section_is_fatal() {
        let err = CommandLibrary::parse(["[debian]", "ls", "[arch]", "pacman -Syu"]).unwrap_err();
        match err {
            LibraryError::UnknownSection { line, name } => {
                assert_eq!(line, 3);
                assert_eq!(name, "arch");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_family_section_rejected() {
        assert!(CommandLibrary::parse(["[unknown]", "ls"]).is_err());
        assert!(CommandLibrary::parse(["[]"]).is_err());
    }

    #[test]
    fn test_render_reparses() {
        let mut library = CommandLibrary::default();
        library.push(OsFamily::Debian, "sudo apt update");
        library.push(OsFamily::Rocky, "sudo dnf check-update");
        library.push(OsFamily::Rocky, "uptime");

        let reparsed: CommandLibrary = library.render().parse().unwrap();
        assert_eq!(reparsed, library);
    }

    #[test]
    fn test_push_unknown_dropped() {
        let mut library = CommandLibrary::default();
        library.push(OsFamily::Unknown, "ls");
        assert!(library.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = CommandLibrary::load("/nonexistent/fleetcmd/commands.txt").unwrap_err();
        assert!(matches!(err, LibraryError::Io { .. }));
    }
}
