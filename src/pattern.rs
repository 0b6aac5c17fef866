use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

/// Flags applied when a regex leaf does not name any
pub const DEFAULT_FLAGS: &str = "i";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("unknown regex flag '{0}'")]
    UnknownFlag(char),
    #[error("regex flag '{0}' given more than once")]
    DuplicateFlag(char),
    #[error("regex flags 'u' and 'v' cannot be combined")]
    ConflictingUnicodeFlags,
    #[error("invalid regex pattern '{pattern}': {reason}")]
    Syntax { pattern: String, reason: String },
}

/// Parsed regex flag set, using the web flag alphabet (`dgimsuvy`)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_all: bool,
    pub sticky: bool,
    pub unicode: bool,
}

impl Flags {
    pub fn parse(flags: &str) -> Result<Self, PatternError> {
        let mut parsed = Flags::default();
        let mut seen = Vec::with_capacity(flags.len());

        for flag in flags.chars() {
            if seen.contains(&flag) {
                return Err(PatternError::DuplicateFlag(flag));
            }
            seen.push(flag);

            match flag {
                'i' => parsed.case_insensitive = true,
                'm' => parsed.multi_line = true,
                's' => parsed.dot_all = true,
                'y' => parsed.sticky = true,
                'u' | 'v' => parsed.unicode = true,
                // Global and indices only change iteration state, which a
                // single test never sees
                'g' | 'd' => {}
                other => return Err(PatternError::UnknownFlag(other)),
            }
        }

        if seen.contains(&'u') && seen.contains(&'v') {
            return Err(PatternError::ConflictingUnicodeFlags);
        }

        Ok(parsed)
    }
}

/// Compile `pattern` with `flags`, falling back to [`DEFAULT_FLAGS`] when none are given
pub fn compile(pattern: &str, flags: Option<&str>) -> Result<Regex, PatternError> {
    let flags = Flags::parse(flags.unwrap_or(DEFAULT_FLAGS))?;

    let body = if flags.unicode {
        pattern.to_string()
    } else {
        ascii_class_escapes(pattern)
    };

    let source = if flags.sticky {
        format!(r"\A(?:{body})")
    } else {
        body
    };

    RegexBuilder::new(&source)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_all)
        .build()
        .map_err(|e| PatternError::Syntax {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Rewrite `\d`, `\D`, `\w` and `\W` as ASCII classes. Without `u`/`v` these
/// escapes only cover ASCII, whereas the `regex` crate makes them Unicode-aware.
/// `\b` keeps Unicode word semantics.
fn ascii_class_escapes(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let Some(escaped) = chars.next() else {
                    out.push(c);
                    break;
                };
                let class = match escaped {
                    'd' => Some("[:digit:]"),
                    'D' => Some("[:^digit:]"),
                    'w' => Some("[:word:]"),
                    'W' => Some("[:^word:]"),
                    _ => None,
                };
                match (class, in_class) {
                    (Some(class), true) => out.push_str(class),
                    (Some(class), false) => {
                        out.push('[');
                        out.push_str(class);
                        out.push(']');
                    }
                    (None, _) => {
                        out.push(c);
                        out.push(escaped);
                    }
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PatternKey {
    pattern: String,
    flags: Option<String>,
}

impl PatternKey {
    fn new(pattern: &str, flags: Option<&str>) -> Self {
        Self {
            pattern: pattern.to_string(),
            flags: flags.map(str::to_string),
        }
    }
}

/// Pre-compiled patterns keyed by (pattern, flags). Failed compilations are
/// cached too, so an invalid pattern is reported once and never rebuilt.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: HashMap<PatternKey, Result<Regex, PatternError>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and remember a pattern. Returns the compile error the first
    /// time an invalid pattern is seen.
    pub fn insert(&mut self, pattern: &str, flags: Option<&str>) -> Result<(), PatternError> {
        let key = PatternKey::new(pattern, flags);
        if self.compiled.contains_key(&key) {
            return Ok(());
        }

        let result = compile(pattern, flags);
        let outcome = result.as_ref().map(|_| ()).map_err(|e| e.clone());
        self.compiled.insert(key, result);
        outcome
    }

    /// `None` when the pattern was never inserted
    pub fn get(&self, pattern: &str, flags: Option<&str>) -> Option<Result<&Regex, &PatternError>> {
        self.compiled
            .get(&PatternKey::new(pattern, flags))
            .map(Result::as_ref)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    pub fn invalid_count(&self) -> usize {
        self.compiled.values().filter(|r| r.is_err()).count()
    }
}
