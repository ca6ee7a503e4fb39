//! Key namespacing shared by both tiers.

/// Builds `{namespace}:{key}` keys and clear prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    namespace: String,
}

impl KeyNamespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Namespaced prefix matched by a clear pattern
    ///
    /// Trailing `*` wildcards are stripped; no pattern selects the whole
    /// namespace.
    pub fn pattern_prefix(&self, pattern: Option<&str>) -> String {
        let pattern = pattern.map(|p| p.trim_end_matches('*')).unwrap_or("");
        format!("{}:{}", self.namespace, pattern)
    }
}

/// Escape Redis glob metacharacters so a literal prefix can be matched
pub fn glob_escape(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^' | '-') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
