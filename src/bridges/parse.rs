//! Parsing helpers for bridge text and indexed preference keys.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

/// Matches `<prefix>.<index>` keys, e.g. `obfs4.3` or `meek-azure.0`.
static INDEXED_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\.([0-9]+)$").unwrap());

/// Split newline-separated bridge text into trimmed, non-empty lines.
pub fn parse_bridge_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split `<prefix>.<index>` into its parts.
pub fn split_indexed_key(key: &str) -> Option<(&str, u64)> {
    let caps = INDEXED_KEY.captures(key)?;
    let prefix = caps.get(1)?.as_str();
    let index = caps.get(2)?.as_str().parse().ok()?;
    Some((prefix, index))
}

/// Order index keys numerically (`2` before `10`); non-numeric keys sort
/// after numeric ones, lexicographically.
pub fn compare_index_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bridge_lines_trims_and_drops_blank() {
        let text = "  obfs4 192.0.2.1:443 AAAA cert=x iat-mode=0 \n\n\r\nobfs4 192.0.2.2:80 BBBB\n   ";
        assert_eq!(
            parse_bridge_lines(text),
            vec![
                "obfs4 192.0.2.1:443 AAAA cert=x iat-mode=0",
                "obfs4 192.0.2.2:80 BBBB"
            ]
        );
        assert!(parse_bridge_lines("").is_empty());
    }

    #[test]
    fn test_split_indexed_key() {
        assert_eq!(split_indexed_key("obfs4.0"), Some(("obfs4", 0)));
        assert_eq!(split_indexed_key("meek-azure.12"), Some(("meek-azure", 12)));
        assert_eq!(split_indexed_key("a.b.3"), Some(("a.b", 3)));
        assert_eq!(split_indexed_key("obfs4"), None);
        assert_eq!(split_indexed_key("obfs4.x"), None);
        assert_eq!(split_indexed_key(".3"), None);
    }

    #[test]
    fn test_compare_index_keys_numeric() {
        let mut keys = vec!["10", "2", "x", "0", "1"];
        keys.sort_by(|a, b| compare_index_keys(a, b));
        assert_eq!(keys, vec!["0", "1", "2", "10", "x"]);
    }
}
