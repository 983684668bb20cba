//! Directory-entry filters shared by every walk.

use serde::{Deserialize, Serialize};

use crate::APP_MARKER;

const JUNK_NAMES: &[&str] = &[
    ".",
    "..",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    "__MACOSX",
    ".Spotlight-V100",
    ".Trashes",
    ".fseventsd",
];

const ISO_EXTENSIONS: &[&str] = &["iso", "cso", "zso", "dax", "jso"];

/// Returns `true` for OS metadata droppings that no walk should look at.
pub fn is_junk_name(name: &str) -> bool {
    name.starts_with("._") || JUNK_NAMES.iter().any(|junk| junk.eq_ignore_ascii_case(name))
}

/// Returns `true` for disc image file names (`.iso`, `.cso`, `.zso`, `.dax`, `.jso`).
pub fn is_iso_like(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(stem, ext)| {
            !stem.is_empty() && ISO_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext))
        })
}

/// Returns `true` for the file name that marks an app folder.
pub fn is_app_marker(name: &str) -> bool {
    name.eq_ignore_ascii_case(APP_MARKER)
}

/// Category folder suffixes the user excluded from categorisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blacklist {
    suffixes: Vec<String>,
}

impl Blacklist {
    /// Builds a blacklist; blank patterns are dropped.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let suffixes = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { suffixes }
    }

    /// Parses the on-disk format: one pattern per line, CRLF or LF.
    pub fn parse(text: &str) -> Self {
        Self::new(text.lines())
    }

    /// Serialises back to the on-disk format.
    pub fn to_file_text(&self) -> String {
        let mut out = String::new();
        for suffix in &self.suffixes {
            out.push_str(suffix);
            out.push_str("\r\n");
        }
        out
    }

    /// Returns `true` if `folder_name` ends with any pattern (case-insensitive).
    pub fn matches(&self, folder_name: &str) -> bool {
        let lower = folder_name.to_ascii_lowercase();
        self.suffixes
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_ascii_lowercase()))
    }

    pub fn patterns(&self) -> &[String] {
        &self.suffixes
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn junk_names_are_case_insensitive() {
        assert!(is_junk_name(".DS_Store"));
        assert!(is_junk_name("thumbs.DB"));
        assert!(is_junk_name("__macosx"));
        assert!(is_junk_name("._EBOOT.PBP"));
        assert!(!is_junk_name("EBOOT.PBP"));
        assert!(!is_junk_name("RPG"));
    }

    #[test]
    fn iso_like_extensions() {
        for name in ["a.iso", "b.CSO", "c.zso", "d.Dax", "e.jso"] {
            assert!(is_iso_like(name), "{name}");
        }
        for name in ["a.pbp", "iso", ".iso", "a.iso.txt"] {
            assert!(!is_iso_like(name), "{name}");
        }
    }

    #[test]
    fn app_marker() {
        assert!(is_app_marker("EBOOT.PBP"));
        assert!(is_app_marker("eboot.pbp"));
        assert!(!is_app_marker("PARAM.SFO"));
    }

    #[test]
    fn blacklist_suffix_match() {
        let bl = Blacklist::parse("_test\r\n\r\n  _OLD \r\n");
        assert_eq!(bl.patterns(), ["_test", "_OLD"]);
        assert!(bl.matches("01CAT_Foo_test"));
        assert!(bl.matches("Games_old"));
        assert!(!bl.matches("Foo_testing"));
    }

    #[test]
    fn blacklist_file_round_trip() {
        let bl = Blacklist::new(["_a", "_b"]);
        assert_eq!(bl.to_file_text(), "_a\r\n_b\r\n");
        assert_eq!(Blacklist::parse(&bl.to_file_text()), bl);
        assert!(Blacklist::default().is_empty());
    }
}
