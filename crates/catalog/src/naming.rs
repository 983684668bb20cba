//! On-disk category naming: `[NN][CAT_]base`.

use serde::{Deserialize, Serialize};

/// Literal token placed in front of the base name when prefixing is on.
pub const CATEGORY_PREFIX: &str = "CAT_";

/// Largest ordinal two digits can hold.
pub const MAX_ORDINAL: u32 = 99;

/// Which decorations category folders carry on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingScheme {
    /// Prepend [`CATEGORY_PREFIX`].
    pub prefix: bool,
    /// Prepend a two-digit ordinal.
    pub numbered: bool,
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn split_ordinal(s: &str) -> Option<(u32, &str)> {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_digit() && bytes[1].is_ascii_digit() {
        let value = u32::from(bytes[0] - b'0') * 10 + u32::from(bytes[1] - b'0');
        Some((value, &s[2..]))
    } else {
        None
    }
}

/// Returns the leading two-digit ordinal of a folder name.
///
/// The ordinal may sit before or after the `CAT_` token.
pub fn parse_ordinal(name: &str) -> Option<u32> {
    if let Some((ordinal, _)) = split_ordinal(name) {
        return Some(ordinal);
    }
    strip_prefix_ignore_case(name, CATEGORY_PREFIX)
        .and_then(split_ordinal)
        .map(|(ordinal, _)| ordinal)
}

/// Recovers the semantic base name of a category folder.
///
/// Strips at most one `CAT_` token and at most one leading two-digit
/// ordinal, in either order.
pub fn strip_category_prefixes(name: &str) -> &str {
    let mut rest = name;
    let mut saw_prefix = false;
    let mut saw_ordinal = false;
    loop {
        if !saw_prefix {
            if let Some(tail) = strip_prefix_ignore_case(rest, CATEGORY_PREFIX) {
                rest = tail;
                saw_prefix = true;
                continue;
            }
        }
        if !saw_ordinal {
            if let Some((_, tail)) = split_ordinal(rest) {
                rest = tail;
                saw_ordinal = true;
                continue;
            }
        }
        return rest;
    }
}

/// Builds the on-disk folder name for `base` under `scheme`.
///
/// An ordinal of 0, or one above [`MAX_ORDINAL`], means "unnumbered" and
/// is never written.
pub fn format_category_name_from_base(base: &str, ordinal: u32, scheme: NamingScheme) -> String {
    let mut out = String::with_capacity(base.len() + 6);
    if scheme.numbered && (1..=MAX_ORDINAL).contains(&ordinal) {
        out.push_str(&format!("{ordinal:02}"));
    }
    if scheme.prefix {
        out.push_str(CATEGORY_PREFIX);
    }
    out.push_str(base);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMES: [NamingScheme; 4] = [
        NamingScheme {
            prefix: false,
            numbered: false,
        },
        NamingScheme {
            prefix: true,
            numbered: false,
        },
        NamingScheme {
            prefix: false,
            numbered: true,
        },
        NamingScheme {
            prefix: true,
            numbered: true,
        },
    ];

    #[test]
    fn strip_handles_both_orders() {
        assert_eq!(strip_category_prefixes("01CAT_Foo_test"), "Foo_test");
        assert_eq!(strip_category_prefixes("CAT_01Foo"), "Foo");
        assert_eq!(strip_category_prefixes("cat_RPG"), "RPG");
        assert_eq!(strip_category_prefixes("05RPG"), "RPG");
        assert_eq!(strip_category_prefixes("RPG"), "RPG");
    }

    #[test]
    fn strip_removes_at_most_one_of_each() {
        assert_eq!(strip_category_prefixes("0102Foo"), "02Foo");
        assert_eq!(strip_category_prefixes("CAT_CAT_Foo"), "CAT_Foo");
    }

    #[test]
    fn format_respects_scheme() {
        assert_eq!(format_category_name_from_base("RPG", 3, SCHEMES[0]), "RPG");
        assert_eq!(format_category_name_from_base("RPG", 3, SCHEMES[1]), "CAT_RPG");
        assert_eq!(format_category_name_from_base("RPG", 3, SCHEMES[2]), "03RPG");
        assert_eq!(format_category_name_from_base("RPG", 3, SCHEMES[3]), "03CAT_RPG");
        assert_eq!(format_category_name_from_base("RPG", 0, SCHEMES[3]), "CAT_RPG");
        assert_eq!(format_category_name_from_base("RPG", 100, SCHEMES[2]), "RPG");
    }

    #[test]
    fn naming_round_trips_for_every_scheme() {
        let bases = ["RPG", "Action Games", "Foo_test", "x", "Puzzle-2", "A1"];
        for scheme in SCHEMES {
            for base in bases {
                for ordinal in [0, 1, 9, 10, 42, 99] {
                    let disk = format_category_name_from_base(base, ordinal, scheme);
                    assert_eq!(
                        strip_category_prefixes(&disk),
                        base,
                        "scheme {scheme:?} ordinal {ordinal} disk {disk}"
                    );
                }
            }
        }
    }

    #[test]
    fn parse_ordinal_either_side_of_prefix() {
        assert_eq!(parse_ordinal("01RPG"), Some(1));
        assert_eq!(parse_ordinal("12CAT_RPG"), Some(12));
        assert_eq!(parse_ordinal("CAT_07RPG"), Some(7));
        assert_eq!(parse_ordinal("CAT_RPG"), None);
        assert_eq!(parse_ordinal("RPG"), None);
        assert_eq!(parse_ordinal("1RPG"), None);
    }
}
