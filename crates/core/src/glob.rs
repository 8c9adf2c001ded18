//! Glob pattern engine (spec §4.6, C11): `*`, `**`, `?`, `[...]`/`[a-z]`,
//! `{a,b,c}` alternation. Matching is always anchored (full-string match).
//! Used directly by callers and by the sparse view (C6) and MCP `search` tool.

#[derive(Debug, Clone)]
enum Token {
    Literal(char),
    Star,
    Globstar,
    Question,
    Class { negated: bool, items: Vec<ClassItem> },
}

#[derive(Debug, Clone)]
enum ClassItem {
    Char(char),
    Range(char, char),
}

impl ClassItem {
    fn matches(&self, c: char) -> bool {
        match self {
            ClassItem::Char(x) => *x == c,
            ClassItem::Range(lo, hi) => *lo <= c && c <= *hi,
        }
    }
}

/// A compiled glob pattern. Cheap to clone; match calls are allocation-light.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    /// One alternative per `{a,b,c}` expansion (cross product of all braces
    /// found in the pattern); matches if any alternative matches.
    alternatives: Vec<Vec<Token>>,
    dot: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GlobOptions {
    /// When true, `*`/`**`/`?` are allowed to match a leading `.` in a path
    /// segment. Defaults to false (shell/gitignore convention).
    pub dot: bool,
}

impl GlobMatcher {
    pub fn compile(pattern: &str) -> Result<Self, GlobError> {
        Self::compile_with(pattern, GlobOptions::default())
    }

    pub fn compile_with(pattern: &str, opts: GlobOptions) -> Result<Self, GlobError> {
        let expansions = brace_expand(pattern)?;
        let mut alternatives = Vec::with_capacity(expansions.len());
        for expansion in expansions {
            alternatives.push(tokenize(&expansion)?);
        }
        Ok(Self { alternatives, dot: opts.dot })
    }

    pub fn is_match(&self, s: &str) -> bool {
        let chars: Vec<char> = s.chars().collect();
        self.alternatives.iter().any(|tokens| match_from(tokens, &chars, self.dot))
    }

    /// Whether `dir` could possibly contain a match for this pattern — used
    /// by the sparse view and `walk` to short-circuit descending into
    /// directories that can never satisfy an include pattern.
    pub fn could_match_prefix(&self, dir: &str) -> bool {
        if dir.is_empty() {
            return true;
        }
        let chars: Vec<char> = dir.chars().collect();
        self.alternatives.iter().any(|tokens| prefix_reachable(tokens, &chars, self.dot))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GlobError {
    #[error("unterminated character class in pattern")]
    UnterminatedClass,
    #[error("unterminated brace group in pattern")]
    UnterminatedBrace,
    #[error("empty character class in pattern")]
    EmptyClass,
}

/// One-shot convenience matching `pattern` against `s` without retaining the
/// compiled form (spec testable property 10: `compile(pat)(s) == match(pat, s)`).
pub fn glob_match(pattern: &str, s: &str) -> Result<bool, GlobError> {
    Ok(GlobMatcher::compile(pattern)?.is_match(s))
}

// ---------------------------------------------------------------------------
// Brace expansion: `{a,b,c}` -> cross product of literal alternatives.
// Only one level of braces is supported (no nesting), matching the spec's
// stated feature set.
// ---------------------------------------------------------------------------

fn brace_expand(pattern: &str) -> Result<Vec<String>, GlobError> {
    let chars: Vec<char> = pattern.chars().collect();
    let Some(open) = chars.iter().position(|&c| c == '{') else {
        return Ok(vec![pattern.to_string()]);
    };
    let Some(close_rel) = chars[open..].iter().position(|&c| c == '}') else {
        return Err(GlobError::UnterminatedBrace);
    };
    let close = open + close_rel;

    let prefix: String = chars[..open].iter().collect();
    let body: String = chars[open + 1..close].iter().collect();
    let suffix: String = chars[close + 1..].iter().collect();

    let mut out = Vec::new();
    for alt in body.split(',') {
        let candidate = format!("{prefix}{alt}{suffix}");
        // Recurse to support multiple (non-nested) brace groups in one pattern.
        out.extend(brace_expand(&candidate)?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn tokenize(pattern: &str) -> Result<Vec<Token>, GlobError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Globstar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '?' => {
                tokens.push(Token::Question);
                i += 1;
            }
            '[' => {
                let start = i + 1;
                let mut j = start;
                let negated = matches!(chars.get(j), Some('!') | Some('^'));
                if negated {
                    j += 1;
                }
                let items_start = j;
                // A `]` immediately after the opening (or negation) is a literal.
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(GlobError::UnterminatedClass);
                }
                let body = &chars[items_start..j];
                if body.is_empty() {
                    return Err(GlobError::EmptyClass);
                }
                let items = parse_class_items(body);
                tokens.push(Token::Class { negated, items });
                i = j + 1;
            }
            c => {
                tokens.push(Token::Literal(c));
                i += 1;
            }
        }
    }
    Ok(tokens)
}

fn parse_class_items(body: &[char]) -> Vec<ClassItem> {
    let mut items = Vec::new();
    let mut i = 0;
    while i < body.len() {
        if i + 2 < body.len() && body[i + 1] == '-' {
            items.push(ClassItem::Range(body[i], body[i + 2]));
            i += 3;
        } else {
            items.push(ClassItem::Char(body[i]));
            i += 1;
        }
    }
    items
}

fn class_matches(negated: bool, items: &[ClassItem], c: char) -> bool {
    let hit = items.iter().any(|it| it.matches(c));
    hit != negated
}

// ---------------------------------------------------------------------------
// Matching — simple recursive backtracking over the token/char sequences.
// Pattern and input lengths in this domain (filesystem paths) are small, so
// backtracking complexity is not a practical concern.
// ---------------------------------------------------------------------------

fn is_leading_dot(s: &[char], pos: usize) -> bool {
    s.get(pos) == Some(&'.') && (pos == 0 || s.get(pos - 1) == Some(&'/'))
}

fn match_from(tokens: &[Token], s: &[char], dot: bool) -> bool {
    match_at(tokens, 0, s, 0, dot)
}

fn match_at(tokens: &[Token], ti: usize, s: &[char], si: usize, dot: bool) -> bool {
    if ti == tokens.len() {
        return si == s.len();
    }
    match &tokens[ti] {
        Token::Literal(c) => {
            si < s.len() && s[si] == *c && match_at(tokens, ti + 1, s, si + 1, dot)
        }
        Token::Question => {
            if si >= s.len() || s[si] == '/' {
                return false;
            }
            if !dot && is_leading_dot(s, si) {
                return false;
            }
            match_at(tokens, ti + 1, s, si + 1, dot)
        }
        Token::Class { negated, items } => {
            if si >= s.len() || s[si] == '/' {
                return false;
            }
            if !dot && is_leading_dot(s, si) {
                return false;
            }
            class_matches(*negated, items, s[si]) && match_at(tokens, ti + 1, s, si + 1, dot)
        }
        Token::Star => {
            if !dot && is_leading_dot(s, si) {
                // `*` may still match the empty string at this position.
                return match_at(tokens, ti + 1, s, si, dot);
            }
            for len in 0..=s.len() - si {
                if s[si..si + len].contains(&'/') {
                    break;
                }
                if match_at(tokens, ti + 1, s, si + len, dot) {
                    return true;
                }
            }
            false
        }
        Token::Globstar => {
            if !dot && is_leading_dot(s, si) {
                return match_at(tokens, ti + 1, s, si, dot);
            }
            for len in 0..=s.len() - si {
                if match_at(tokens, ti + 1, s, si + len, dot) {
                    return true;
                }
            }
            false
        }
    }
}

/// Whether some suffix could extend `prefix_chars` into a full match — used
/// to decide whether a directory is worth descending into.
fn prefix_reachable(tokens: &[Token], prefix: &[char], dot: bool) -> bool {
    prefix_reachable_at(tokens, 0, prefix, 0, dot)
}

fn prefix_reachable_at(tokens: &[Token], ti: usize, s: &[char], si: usize, dot: bool) -> bool {
    if si == s.len() {
        // Whole prefix consumed by some point in the pattern: reachable.
        return true;
    }
    if ti == tokens.len() {
        return false;
    }
    match &tokens[ti] {
        Token::Literal(c) => {
            si < s.len() && s[si] == *c && prefix_reachable_at(tokens, ti + 1, s, si + 1, dot)
        }
        Token::Question | Token::Class { .. } => {
            if si >= s.len() || s[si] == '/' {
                return false;
            }
            if !dot && is_leading_dot(s, si) {
                return false;
            }
            prefix_reachable_at(tokens, ti + 1, s, si + 1, dot)
        }
        Token::Star => {
            if !dot && is_leading_dot(s, si) {
                return prefix_reachable_at(tokens, ti + 1, s, si, dot);
            }
            for len in 0..=s.len() - si {
                if s[si..si + len].contains(&'/') {
                    break;
                }
                if prefix_reachable_at(tokens, ti + 1, s, si + len, dot) {
                    return true;
                }
            }
            false
        }
        Token::Globstar => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_star() {
        assert!(glob_match("*.rs", "main.rs").unwrap());
        assert!(!glob_match("*.rs", "main.rs.bak").unwrap());
        assert!(!glob_match("*.rs", "src/main.rs").unwrap());
    }

    #[test]
    fn globstar_crosses_segments() {
        assert!(glob_match("**/*.rs", "src/a/b/main.rs").unwrap());
        assert!(glob_match("**/*.rs", "main.rs").unwrap());
        assert!(glob_match("src/**", "src/a/b/c").unwrap());
    }

    #[test]
    fn question_and_class() {
        assert!(glob_match("a?c", "abc").unwrap());
        assert!(!glob_match("a?c", "ac").unwrap());
        assert!(glob_match("[abc].txt", "a.txt").unwrap());
        assert!(glob_match("[a-z].txt", "m.txt").unwrap());
        assert!(!glob_match("[a-z].txt", "M.txt").unwrap());
        assert!(glob_match("[!a-z].txt", "M.txt").unwrap());
    }

    #[test]
    fn alternation() {
        assert!(glob_match("*.{js,ts}", "app.ts").unwrap());
        assert!(glob_match("*.{js,ts}", "app.js").unwrap());
        assert!(!glob_match("*.{js,ts}", "app.py").unwrap());
    }

    #[test]
    fn dot_option_excludes_hidden_by_default() {
        assert!(!glob_match("*", ".hidden").unwrap());
        let m = GlobMatcher::compile_with("*", GlobOptions { dot: true }).unwrap();
        assert!(m.is_match(".hidden"));
    }

    #[test]
    fn anchored_full_match() {
        assert!(!glob_match("a*", "xa").unwrap());
        assert!(glob_match("*a*", "xax").unwrap());
    }

    #[test]
    fn compile_then_match_matches_one_shot() {
        for (pat, s) in [
            ("**/*.rs", "a/b/c.rs"),
            ("src/*.{ts,tsx}", "src/app.tsx"),
            ("[a-c]??", "b12"),
        ] {
            let compiled = GlobMatcher::compile(pat).unwrap().is_match(s);
            let one_shot = glob_match(pat, s).unwrap();
            assert_eq!(compiled, one_shot, "mismatch for {pat:?} vs {s:?}");
        }
    }

    #[test]
    fn could_match_prefix_short_circuits() {
        let m = GlobMatcher::compile("src/*.rs").unwrap();
        assert!(m.could_match_prefix("src"));
        assert!(!m.could_match_prefix("lib"));
        let m2 = GlobMatcher::compile("**/*.rs").unwrap();
        assert!(m2.could_match_prefix("anything/nested"));
    }
}
