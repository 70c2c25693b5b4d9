//! Route patterns: parsing and path matching.
//!
//! A pattern is the `/`-split form of a registration path. Each segment is
//! one of three shapes:
//!
//! - **Literal** — `users` matches exactly itself.
//! - **Param** — `:id` binds the whole path segment under the name `id`;
//!   `id:x` requires the segment to start with `id:` and binds the rest
//!   under `x`. A segment containing `:` is always a param, so `:` cannot
//!   be combined with wildcards.
//! - **Wildcard** — any segment containing `*` or `?`. `*` captures a run of
//!   characters (possibly empty), `?` captures exactly one. `a*b` against
//!   `aXYZb` captures `XYZ`.
//!
//! The wildcard matcher is single-pass: `*` captures up to the first
//! occurrence of the following literal and never reconsiders. `*a` against
//! `aa` therefore fails: `*` captures the empty run before the first `a`,
//! the literal consumes it, and the final `a` is left over. Adjacent
//! wildcards that would make a capture ambiguous (`**`, `?*`, `*?`) are
//! rejected at parse time; `??` is fine because each `?` takes exactly one
//! character.
//!
//! Matching happens under a *mount prefix*: the patterns of the sub-router
//! mounts traversed so far. Their segments are virtually prepended, so a
//! router never needs to know where it is mounted.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PathError;

/// A parsed route pattern.
///
/// The empty pattern (from `""` or `"/"`) has no segments: it exact-matches
/// the root path and prefix-matches everything, which is what makes it the
/// natural pattern for router-wide middleware.
#[derive(Debug, PartialEq)]
pub(crate) struct Pattern {
    segments: Vec<Segment>,
}

#[derive(Debug, PartialEq)]
enum Segment {
    Literal(String),
    Param { prefix: String, name: String },
    Wildcard(Vec<Token>),
}

#[derive(Debug, PartialEq)]
enum Token {
    Text(String),
    Star,
    Question,
}

/// The verdict of matching one pattern against a path.
///
/// `exact` is only ever true when `matched` is: a failed match reports
/// neither, with empty bindings.
#[derive(Debug)]
pub(crate) struct MatchOutcome {
    pub matched: bool,
    pub exact: bool,
    pub params: HashMap<String, String>,
    pub captures: Vec<String>,
}

impl MatchOutcome {
    fn failure() -> Self {
        Self {
            matched: false,
            exact: false,
            params: HashMap::new(),
            captures: Vec::new(),
        }
    }
}

impl Pattern {
    pub(crate) fn parse(path: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        for raw in path.split('/').filter(|s| !s.is_empty()) {
            segments.push(Segment::parse(raw)?);
        }
        Ok(Self { segments })
    }

    /// Matches `path` against this pattern with the mount prefix's segments
    /// virtually prepended.
    ///
    /// `matched` means every segment of the combined pattern consumed a path
    /// part in order; `exact` additionally means no path parts were left
    /// over. Bindings accumulate into the outcome only on success, so a
    /// failed probe leaves no trace.
    pub(crate) fn match_path(&self, prefix: &[Arc<Pattern>], path: &str) -> MatchOutcome {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let segments: Vec<&Segment> = prefix
            .iter()
            .flat_map(|pattern| pattern.segments.iter())
            .chain(self.segments.iter())
            .collect();

        if segments.len() > parts.len() {
            return MatchOutcome::failure();
        }

        let mut params = HashMap::new();
        let mut captures = Vec::new();
        for (segment, part) in segments.iter().zip(parts.iter().copied()) {
            if !segment.matches(part, &mut params, &mut captures) {
                return MatchOutcome::failure();
            }
        }

        MatchOutcome {
            matched: true,
            exact: segments.len() == parts.len(),
            params,
            captures,
        }
    }
}

impl Segment {
    fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.contains(':') {
            let parts: Vec<&str> = raw.split(':').collect();
            let [prefix, name] = parts[..] else {
                return Err(PathError::ParamSegment(raw.to_owned()));
            };
            let prefix = if prefix.is_empty() {
                String::new()
            } else {
                format!("{prefix}:")
            };
            return Ok(Self::Param { prefix, name: name.to_owned() });
        }
        if raw.contains('*') || raw.contains('?') {
            return Ok(Self::Wildcard(tokenize(raw)?));
        }
        Ok(Self::Literal(raw.to_owned()))
    }

    fn matches(
        &self,
        part: &str,
        params: &mut HashMap<String, String>,
        captures: &mut Vec<String>,
    ) -> bool {
        match self {
            Self::Literal(text) => text == part,
            Self::Param { prefix, name } => match part.strip_prefix(prefix.as_str()) {
                Some(rest) => {
                    params.insert(name.clone(), rest.to_owned());
                    true
                }
                None => false,
            },
            Self::Wildcard(tokens) => match_wildcard(tokens, part, captures),
        }
    }
}

fn tokenize(segment: &str) -> Result<Vec<Token>, PathError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    for c in segment.chars() {
        let token = match c {
            '*' => Token::Star,
            '?' => Token::Question,
            _ => {
                literal.push(c);
                continue;
            }
        };
        if !literal.is_empty() {
            tokens.push(Token::Text(std::mem::take(&mut literal)));
        }
        let ambiguous = matches!(
            (tokens.last(), &token),
            (Some(Token::Star), Token::Star)
                | (Some(Token::Star), Token::Question)
                | (Some(Token::Question), Token::Star)
        );
        if ambiguous {
            return Err(PathError::AdjacentWildcards(segment.to_owned()));
        }
        tokens.push(token);
    }
    if !literal.is_empty() {
        tokens.push(Token::Text(literal));
    }
    Ok(tokens)
}

fn match_wildcard(tokens: &[Token], part: &str, captures: &mut Vec<String>) -> bool {
    let mut local = Vec::new();
    let mut cursor = 0usize;
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        match token {
            Token::Text(text) => {
                if !part[cursor..].starts_with(text.as_str()) {
                    return false;
                }
                cursor += text.len();
            }
            Token::Question => {
                let Some(c) = part[cursor..].chars().next() else {
                    return false;
                };
                local.push(c.to_string());
                cursor += c.len_utf8();
            }
            Token::Star => match iter.peek() {
                Some(Token::Text(text)) => {
                    let Some(offset) = part[cursor..].find(text.as_str()) else {
                        return false;
                    };
                    local.push(part[cursor..cursor + offset].to_owned());
                    cursor += offset;
                }
                // Parsing rejects adjacent wildcards, so a star is always
                // followed by text or nothing.
                Some(Token::Star | Token::Question) => return false,
                None => {
                    local.push(part[cursor..].to_owned());
                    cursor = part.len();
                }
            },
        }
    }
    if cursor != part.len() {
        return false;
    }
    captures.append(&mut local);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(path: &str) -> Pattern {
        Pattern::parse(path).unwrap()
    }

    fn outcome(pattern: &str, path: &str) -> MatchOutcome {
        pat(pattern).match_path(&[], path)
    }

    #[test]
    fn splits_on_slashes_and_drops_empty_segments() {
        assert_eq!(pat("/users/list").segments, pat("//users///list/").segments);
        assert_eq!(pat("/users/:id").segments, pat("users/:id/").segments);
        assert!(pat("/").segments.is_empty());
        assert!(pat("").segments.is_empty());
    }

    #[test]
    fn colon_segment_parses_as_param() {
        assert_eq!(
            pat("/:id").segments,
            vec![Segment::Param { prefix: String::new(), name: "id".to_owned() }]
        );
        assert_eq!(
            pat("/id:x").segments,
            vec![Segment::Param { prefix: "id:".to_owned(), name: "x".to_owned() }]
        );
    }

    #[test]
    fn colon_takes_precedence_over_wildcards() {
        assert_eq!(
            pat("/a:b*c").segments,
            vec![Segment::Param { prefix: "a:".to_owned(), name: "b*c".to_owned() }]
        );
    }

    #[test]
    fn multiple_colons_are_rejected() {
        assert_eq!(
            Pattern::parse("/a:b:c"),
            Err(PathError::ParamSegment("a:b:c".to_owned()))
        );
    }

    #[test]
    fn wildcard_segment_tokenizes_into_runs() {
        assert_eq!(
            pat("/a*b").segments,
            vec![Segment::Wildcard(vec![
                Token::Text("a".to_owned()),
                Token::Star,
                Token::Text("b".to_owned()),
            ])]
        );
        assert_eq!(
            pat("/*.jpg").segments,
            vec![Segment::Wildcard(vec![Token::Star, Token::Text(".jpg".to_owned())])]
        );
    }

    #[test]
    fn adjacent_stars_are_rejected_but_double_question_is_not() {
        for bad in ["/**", "/?*", "/*?", "/a**b"] {
            assert_eq!(
                Pattern::parse(bad),
                Err(PathError::AdjacentWildcards(bad[1..].to_owned())),
                "{bad} should be rejected"
            );
        }
        assert_eq!(
            pat("/??").segments,
            vec![Segment::Wildcard(vec![Token::Question, Token::Question])]
        );
    }

    #[test]
    fn literal_segments_match_exactly() {
        assert!(outcome("/users", "/users").matched);
        assert!(!outcome("/users", "/user").matched);
    }

    #[test]
    fn bare_param_binds_the_whole_segment() {
        let m = outcome("/users/:id", "/users/42");
        assert!(m.exact);
        assert_eq!(m.params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn prefixed_param_requires_the_prefix_and_binds_the_rest() {
        let m = outcome("/id:x", "/id:42");
        assert!(m.exact);
        assert_eq!(m.params.get("x").map(String::as_str), Some("42"));
        assert!(!outcome("/id:x", "/42").matched);
    }

    #[test]
    fn star_captures_the_run_between_literals() {
        let m = outcome("/a*b", "/aXYZb");
        assert!(m.exact);
        assert_eq!(m.captures, vec!["XYZ"]);
    }

    #[test]
    fn star_capture_may_be_empty() {
        let m = outcome("/a*b", "/ab");
        assert!(m.exact);
        assert_eq!(m.captures, vec![""]);
    }

    #[test]
    fn star_requires_the_following_literal() {
        assert!(!outcome("/a*b", "/aXYZ").matched);
    }

    #[test]
    fn trailing_star_captures_the_remainder() {
        let m = outcome("/file-*", "/file-report");
        assert!(m.exact);
        assert_eq!(m.captures, vec!["report"]);
    }

    #[test]
    fn star_does_not_backtrack() {
        // `*` commits to the first `a`, leaving the second unconsumed.
        assert!(!outcome("/*a", "/aa").matched);
    }

    #[test]
    fn multiple_stars_capture_in_order() {
        let m = outcome("/a*b*c", "/aXbYc");
        assert!(m.exact);
        assert_eq!(m.captures, vec!["X", "Y"]);
    }

    #[test]
    fn question_captures_exactly_one_character() {
        let m = outcome("/a?c", "/abc");
        assert!(m.exact);
        assert_eq!(m.captures, vec!["b"]);
        assert!(!outcome("/a?c", "/ac").matched);

        let m = outcome("/??", "/ab");
        assert_eq!(m.captures, vec!["a", "b"]);
    }

    #[test]
    fn leftover_path_characters_fail_the_segment() {
        assert!(!outcome("/a*b", "/aXbZ").matched);
    }

    #[test]
    fn shorter_paths_never_match() {
        assert!(!outcome("/users/:id", "/users").matched);
    }

    #[test]
    fn longer_paths_match_as_prefix_only() {
        let m = outcome("/users", "/users/42");
        assert!(m.matched);
        assert!(!m.exact);
    }

    #[test]
    fn empty_pattern_is_root_exact_and_universal_prefix() {
        assert!(outcome("", "/").exact);
        let m = outcome("", "/anything/at/all");
        assert!(m.matched);
        assert!(!m.exact);
    }

    #[test]
    fn mount_prefix_segments_are_prepended() {
        let prefix = [Arc::new(pat("/api"))];
        let m = pat("/ping").match_path(&prefix, "/api/ping");
        assert!(m.exact);
        assert!(!pat("/ping").match_path(&prefix, "/ping").matched);
    }

    #[test]
    fn failed_matches_bind_nothing() {
        let m = outcome("/users/:id/posts", "/users/42/comments");
        assert!(!m.matched);
        assert!(m.params.is_empty());
        assert!(m.captures.is_empty());
    }
}
