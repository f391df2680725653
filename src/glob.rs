//! Shell-style glob matching extended with a single `**` token that matches
//! zero or more whole path segments. Used by cache layers and filters that
//! key on URL shape rather than exact URLs.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GlobError {
    #[error("pattern contains more than one '**'")]
    MultipleDoubleStar,
    #[error("'**' must be delimited by '/' or the start/end of the pattern")]
    UndelimitedDoubleStar,
}

/// Match `name` against `pattern`.
///
/// `pattern` may contain at most one `**`, which must be delimited by `/`
/// (or sit at the start/end of the string), and matches zero or more
/// slash-separated segments. Everything else uses base shell-glob
/// semantics (`*` within a segment, `?` for a single character).
///
/// Returns an error, never `false`, for malformed patterns.
pub fn matches(pattern: &str, name: &str) -> Result<bool, GlobError> {
    let Some(star_pos) = pattern.find("**") else {
        return Ok(base_glob_match(pattern, name));
    };

    if pattern[star_pos + 2..].find("**").is_some() {
        return Err(GlobError::MultipleDoubleStar);
    }

    let before = &pattern[..star_pos];
    let after = &pattern[star_pos + 2..];

    let before_ok = star_pos == 0 || before.ends_with('/');
    let after_ok = after.is_empty() || after.starts_with('/');
    if !before_ok || !after_ok {
        return Err(GlobError::UndelimitedDoubleStar);
    }

    // Trim the single separator adjoining `**` so prefix/suffix patterns
    // describe whole segments, not an empty leading/trailing one.
    let prefix_pattern = before.strip_suffix('/').unwrap_or(before);
    let suffix_pattern = after.strip_prefix('/').unwrap_or(after);

    let prefix_segments = if prefix_pattern.is_empty() {
        0
    } else {
        prefix_pattern.matches('/').count() + 1
    };
    let suffix_segments = if suffix_pattern.is_empty() {
        0
    } else {
        suffix_pattern.matches('/').count() + 1
    };

    let name_segments: Vec<&str> = name.split('/').collect();
    if name_segments.len() < prefix_segments + suffix_segments {
        return Ok(false);
    }

    let name_prefix = name_segments[..prefix_segments].join("/");
    let name_suffix = name_segments[name_segments.len() - suffix_segments..].join("/");

    let prefix_matches = prefix_segments == 0 || base_glob_match(prefix_pattern, &name_prefix);
    let suffix_matches = suffix_segments == 0 || base_glob_match(suffix_pattern, &name_suffix);

    Ok(prefix_matches && suffix_matches)
}

/// Base shell-glob matcher: `*` matches any run of characters within a
/// component (including `/`, since by this point `**` has already been
/// split off), `?` matches exactly one character, everything else is
/// literal.
fn base_glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    glob_match_chars(&p, &n)
}

fn glob_match_chars(pattern: &[char], name: &[char]) -> bool {
    match pattern.first() {
        None => name.is_empty(),
        Some('*') => {
            glob_match_chars(&pattern[1..], name)
                || (!name.is_empty() && glob_match_chars(pattern, &name[1..]))
        }
        Some('?') => !name.is_empty() && glob_match_chars(&pattern[1..], &name[1..]),
        Some(c) => name.first() == Some(c) && glob_match_chars(&pattern[1..], &name[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_star_alone_matches_everything() {
        for s in ["", "a", "a/b/c", "/leading"] {
            assert!(matches("**", s).unwrap());
        }
    }

    #[test]
    fn double_star_matches_zero_segments() {
        assert!(matches("a/**/c", "a/c").unwrap());
    }

    #[test]
    fn double_star_matches_multiple_segments() {
        assert!(matches("a/**/c", "a/b/x/c").unwrap());
    }

    #[test]
    fn double_star_requires_matching_suffix_depth() {
        // suffix pattern is "c" (1 segment); "a/b/c/d" can't supply a
        // 1-segment suffix equal to "c" since the last segment is "d".
        assert!(!matches("a/**/c", "a/b/c/d").unwrap());
    }

    #[test]
    fn too_few_segments_is_false_not_error() {
        assert!(!matches("a/b/**/c/d", "a/c/d").unwrap());
    }

    #[test]
    fn multiple_double_stars_is_an_error() {
        assert_eq!(
            matches("a/**/b/**/c", "a/b/c"),
            Err(GlobError::MultipleDoubleStar)
        );
    }

    #[test]
    fn undelimited_double_star_is_an_error() {
        assert_eq!(
            matches("a**b", "ab"),
            Err(GlobError::UndelimitedDoubleStar)
        );
    }

    #[test]
    fn base_glob_without_double_star() {
        assert!(matches("*.json", "config.json").unwrap());
        assert!(!matches("*.json", "config.toml").unwrap());
    }

    #[test]
    fn leading_and_trailing_slash_are_significant() {
        assert!(matches("/simple/**", "/simple/foo").unwrap());
        assert!(!matches("/simple/**", "simple/foo").unwrap());
    }
}
