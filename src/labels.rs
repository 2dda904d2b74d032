/// Decode a bracket/comma encoded list such as `"[a, b, c]"`.
///
/// Brackets are stripped wherever they appear, so unbalanced input is fine.
/// Source order and duplicates are kept.
pub fn parse_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    raw.replace(['[', ']'], "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_list() {
        assert_eq!(parse_list(Some("[a, b, c]")), vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_and_absent() {
        assert!(parse_list(Some("")).is_empty());
        assert!(parse_list(None).is_empty());
        assert!(parse_list(Some("[ ]")).is_empty());
    }

    #[test]
    fn drops_empty_pieces() {
        assert_eq!(parse_list(Some("a,,b")), vec!["a", "b"]);
        assert_eq!(parse_list(Some(" , a ,")), vec!["a"]);
    }

    #[test]
    fn keeps_duplicates_and_order() {
        assert_eq!(parse_list(Some("z, a, z")), vec!["z", "a", "z"]);
    }

    #[test]
    fn unbalanced_brackets() {
        assert_eq!(parse_list(Some("[x, y")), vec!["x", "y"]);
        assert_eq!(parse_list(Some("x], [y]]")), vec!["x", "y"]);
        assert_eq!(parse_list(Some("a[b]c")), vec!["abc"]);
    }
}
