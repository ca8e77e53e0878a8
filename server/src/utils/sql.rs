//! SQL utility functions

use std::convert::Infallible;

/// Escape SQL LIKE metacharacters (%, _, \) in user input
///
/// Use this when building LIKE patterns from user input to prevent
/// unintended pattern matching.
///
/// # Example
///
/// ```
/// use memberhub_server::utils::sql::escape_like_pattern;
///
/// let user_input = "100% match_test";
/// let pattern = format!("%{}%", escape_like_pattern(user_input));
/// assert_eq!(pattern, "%100\\% match\\_test%");
/// ```
pub fn escape_like_pattern(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Check that `s` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`)
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Rewrite every `:name` placeholder in `sql` through `f`
///
/// The scan is placeholder-aware rather than textual:
/// - `::type` casts are copied untouched
/// - single-quoted literals and double-quoted identifiers are copied untouched
/// - a `:` not followed by an identifier start is kept as-is
///
/// `f` receives the bare name (without the colon) and returns the full
/// replacement text.
pub fn rewrite_placeholders<E>(
    sql: &str,
    mut f: impl FnMut(&str) -> Result<String, E>,
) -> Result<String, E> {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut rest = sql;

    while let Some(pos) = rest.find(|c: char| matches!(c, ':' | '\'' | '"')) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("::") {
            out.push_str("::");
            rest = after;
            continue;
        }

        if let Some(quote) = tail.chars().next().filter(|c| *c == '\'' || *c == '"') {
            let len = tail[1..].find(quote).map_or(tail.len(), |p| p + 2);
            out.push_str(&tail[..len]);
            rest = &tail[len..];
            continue;
        }

        let name_len = tail[1..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(tail.len() - 1);
        let name = &tail[1..1 + name_len];
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            out.push(':');
            rest = &tail[1..];
            continue;
        }

        out.push_str(&f(name)?);
        rest = &tail[1 + name_len..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Append `_{index}` to every `:name` placeholder in `sql`
///
/// ```
/// use memberhub_server::utils::sql::suffix_placeholders;
///
/// let sql = suffix_placeholders("(t.flags->>'x')::boolean = :valueA", 3);
/// assert_eq!(sql, "(t.flags->>'x')::boolean = :valueA_3");
/// ```
pub fn suffix_placeholders(sql: &str, index: usize) -> String {
    rewrite_placeholders::<Infallible>(sql, |name| Ok(format!(":{}_{}", name, index)))
        .unwrap_or_else(|never| match never {})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_pattern_no_special_chars() {
        assert_eq!(escape_like_pattern("hello"), "hello");
    }

    #[test]
    fn test_escape_like_pattern_percent() {
        assert_eq!(escape_like_pattern("100%"), "100\\%");
    }

    #[test]
    fn test_escape_like_pattern_underscore() {
        assert_eq!(escape_like_pattern("foo_bar"), "foo\\_bar");
    }

    #[test]
    fn test_escape_like_pattern_multiple() {
        assert_eq!(escape_like_pattern("100%_\\test"), "100\\%\\_\\\\test");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("newsletter_status"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("name; DROP TABLE contact"));
        assert!(!is_identifier("item.email"));
    }

    #[test]
    fn test_suffix_simple_placeholders() {
        assert_eq!(
            suffix_placeholders("x BETWEEN :valueA AND :valueB", 7),
            "x BETWEEN :valueA_7 AND :valueB_7"
        );
    }

    #[test]
    fn test_suffix_leaves_casts_alone() {
        let sql = "(item.profile ->> 'deliveryOptIn')::boolean = :valueA";
        assert_eq!(
            suffix_placeholders(sql, 0),
            "(item.profile ->> 'deliveryOptIn')::boolean = :valueA_0"
        );
        assert_eq!(suffix_placeholders("field::boolean", 4), "field::boolean");
    }

    #[test]
    fn test_suffix_cast_on_placeholder() {
        assert_eq!(suffix_placeholders(":valueA::date", 2), ":valueA_2::date");
    }

    #[test]
    fn test_suffix_skips_quoted_text() {
        let sql = "x = ':notParam' AND \"we:ird\" = :p AND t > '12:30'";
        assert_eq!(
            suffix_placeholders(sql, 1),
            "x = ':notParam' AND \"we:ird\" = :p_1 AND t > '12:30'"
        );
    }

    #[test]
    fn test_suffix_ignores_bare_colons() {
        assert_eq!(suffix_placeholders("a : b :1 :", 0), "a : b :1 :");
    }

    #[test]
    fn test_suffix_non_ascii_text() {
        assert_eq!(
            suffix_placeholders("name = 'Zoë' OR n = :valueA", 5),
            "name = 'Zoë' OR n = :valueA_5"
        );
    }

    #[test]
    fn test_rewrite_placeholders_error_propagates() {
        let result: Result<String, String> =
            rewrite_placeholders("a = :missing", |name| Err(name.to_string()));
        assert_eq!(result.unwrap_err(), "missing");
    }
}
