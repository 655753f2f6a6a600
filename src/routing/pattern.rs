//! URL pattern compilation.
//!
//! # Responsibilities
//! - Compile `:name` token patterns into anchored regexes with named
//!   capture groups matching any run of non-`/` characters
//! - Wrap raw regexes, exposing unnamed groups as `param0`, `param1`, …
//! - Reject duplicate token names within one pattern at compile time

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

/// Error type for pattern compilation.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("duplicate parameter ':{name}' in pattern '{pattern}'")]
    DuplicateParam { pattern: String, name: String },
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        source: Box<regex::Error>,
    },
}

/// A compiled URL pattern: the original string, its regex, and the ordered
/// parameter names (empty for raw-regex bindings).
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    raw: String,
    regex: Regex,
    params: Vec<String>,
    named: bool,
}

impl CompiledPattern {
    /// Compile a `:name` token pattern. Literal segments are escaped, each
    /// token becomes a named group matching `[^/]+`.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let mut params: Vec<String> = Vec::new();
        let mut source = String::from("^");

        for (i, segment) in pattern.split('/').enumerate() {
            if i > 0 {
                source.push('/');
            }
            match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() => {
                    if params.iter().any(|p| p == name) {
                        return Err(PatternError::DuplicateParam {
                            pattern: pattern.to_string(),
                            name: name.to_string(),
                        });
                    }
                    params.push(name.to_string());
                    source.push_str(&format!("(?P<{name}>[^/]+)"));
                }
                _ => source.push_str(&regex::escape(segment)),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|source| PatternError::InvalidRegex {
            pattern: pattern.to_string(),
            source: Box::new(source),
        })?;

        Ok(Self {
            raw: pattern.to_string(),
            regex,
            params,
            named: true,
        })
    }

    /// Wrap a raw regex. No named-group extraction; unnamed capture groups
    /// surface as `param0`, `param1`, … in match results.
    pub fn from_regex(pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(pattern).map_err(|source| PatternError::InvalidRegex {
            pattern: pattern.to_string(),
            source: Box::new(source),
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
            params: Vec::new(),
            named: false,
        })
    }

    /// The original pattern string, used for removal by equality.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Declared parameter names in order of appearance.
    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    /// Match `path` in full, extracting parameters on success.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != path.len() {
            return None;
        }

        let mut extracted = HashMap::new();
        if self.named {
            for name in &self.params {
                if let Some(m) = caps.name(name) {
                    extracted.insert(name.clone(), m.as_str().to_string());
                }
            }
        } else {
            for (i, group) in caps.iter().skip(1).enumerate() {
                if let Some(m) = group {
                    extracted.insert(format!("param{i}"), m.as_str().to_string());
                }
            }
        }
        Some(extracted)
    }
}
