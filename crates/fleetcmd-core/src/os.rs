//! Operating system family detection

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Command run on every host to identify its operating system
pub const OS_PROBE_COMMAND: &str = "cat /etc/os-release";

/// Coarse OS bucket used to select a command set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Debian, Ubuntu and derivatives
    Debian,
    /// openSUSE Leap / Tumbleweed
    Opensuse,
    /// Rocky, CentOS, RHEL, Fedora
    Rocky,
    /// Not recognized
    Unknown,
}

impl OsFamily {
    /// Families that can carry commands, in canonical order
    pub const KNOWN: [OsFamily; 3] = [OsFamily::Debian, OsFamily::Opensuse, OsFamily::Rocky];

    /// Lower-case name, as used in command library section headers
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OsFamily::Debian => "debian",
            OsFamily::Opensuse => "opensuse",
            OsFamily::Rocky => "rocky",
            OsFamily::Unknown => "unknown",
        }
    }

    /// Look up a known family by section name (already lower-cased)
    #[must_use]
    pub fn from_section_name(name: &str) -> Option<Self> {
        Self::KNOWN.into_iter().find(|f| f.as_str() == name)
    }

    #[must_use]
    pub fn is_known(self) -> bool {
        self != OsFamily::Unknown
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify raw `/etc/os-release` text
///
/// Keywords are tested case-insensitively in priority order, so text mentioning both
/// "debian" and "fedora" is Debian. Never fails; anything unrecognized is `Unknown`.
#[must_use]
pub fn classify(raw: &str) -> OsFamily {
    let text = raw.to_lowercase();
    let contains_any = |words: &[&str]| words.iter().any(|w| text.contains(w));

    if contains_any(&["ubuntu", "debian"]) {
        OsFamily::Debian
    } else if contains_any(&["opensuse"]) {
        OsFamily::Opensuse
    } else if contains_any(&["rocky", "centos", "redhat", "fedora"]) {
        OsFamily::Rocky
    } else {
        OsFamily::Unknown
    }
}

/// Selected fields of `/etc/os-release`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRelease {
    /// `ID`
    pub id: Option<String>,
    /// `NAME`
    pub name: Option<String>,
    /// `VERSION_ID`
    pub version_id: Option<String>,
    /// `PRETTY_NAME`
    pub pretty_name: Option<String>,
}

impl OsRelease {
    /// Parse `KEY=value` lines, ignoring anything else
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let fields: HashMap<&str, String> = raw
            .lines()
            .filter_map(|line| line.trim().split_once('='))
            .map(|(key, value)| (key.trim(), unquote(value.trim())))
            .collect();

        let get = |key: &str| fields.get(key).filter(|v| !v.is_empty()).cloned();

        Self {
            id: get("ID"),
            name: get("NAME"),
            version_id: get("VERSION_ID"),
            pretty_name: get("PRETTY_NAME"),
        }
    }

    /// Best human-readable label available
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.pretty_name.as_deref().or(self.name.as_deref())
    }
}

fn unquote(value: &str) -> String {
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    stripped.unwrap_or(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const UBUNTU: &str = r#"PRETTY_NAME="Ubuntu 24.04.1 LTS"
NAME="Ubuntu"
VERSION_ID="24.04"
ID=ubuntu
ID_LIKE=debian"#;

    const ROCKY: &str = r#"NAME="Rocky Linux"
VERSION="9.4 (Blue Onyx)"
ID="rocky"
ID_LIKE="rhel centos fedora"
VERSION_ID="9.4"
PRETTY_NAME="Rocky Linux 9.4 (Blue Onyx)""#;

    const LEAP: &str = r#"NAME="openSUSE Leap"
VERSION="15.6"
ID="opensuse-leap"
ID_LIKE="suse opensuse"
PRETTY_NAME="openSUSE Leap 15.6""#;

    #[test]
    fn test_classify_real_os_release() {
        assert_eq!(classify(UBUNTU), OsFamily::Debian);
        assert_eq!(classify(ROCKY), OsFamily::Rocky);
        assert_eq!(classify(LEAP), OsFamily::Opensuse);
    }

    #[test]
    fn test_classify_rocky_keywords() {
        assert_eq!(classify("ID=centos"), OsFamily::Rocky);
        assert_eq!(classify("NAME=RedHat"), OsFamily::Rocky);
        assert_eq!(classify("ID=fedora"), OsFamily::Rocky);
    }

    #[test]
    fn test_classify_priority() {
        assert_eq!(classify("ID=debian\nID_LIKE=fedora"), OsFamily::Debian);
        assert_eq!(classify("opensuse fedora"), OsFamily::Opensuse);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify(""), OsFamily::Unknown);
        assert_eq!(classify("ID=arch\nNAME=\"Arch Linux\""), OsFamily::Unknown);
        assert_eq!(classify("\u{fffd}\u{0}garbage"), OsFamily::Unknown);
    }

    #[test]
    fn test_section_names() {
        assert_eq!(OsFamily::from_section_name("rocky"), Some(OsFamily::Rocky));
        assert_eq!(OsFamily::from_section_name("unknown"), None);
        assert_eq!(OsFamily::from_section_name("arch"), None);
        assert!(!OsFamily::Unknown.is_known());
    }

    #[test]
    fn test_os_release_fields() {
        let release = OsRelease::parse(ROCKY);
        assert_eq!(release.id.as_deref(), Some("rocky"));
        assert_eq!(release.version_id.as_deref(), Some("9.4"));
        assert_eq!(release.display_name(), Some("Rocky Linux 9.4 (Blue Onyx)"));
    }

    #[test]
    fn test_os_release_garbage() {
        let release = OsRelease::parse("no equals here\n=\nID=");
        assert_eq!(release, OsRelease::default());
        assert_eq!(release.display_name(), None);
    }
}
