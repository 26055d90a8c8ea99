//! Tenant key namespacing.
//!
//! Every key going into the store is rewritten as `prefix + key`, and every
//! key coming back out has the prefix removed, so a tenant never sees or
//! touches another tenant's keys.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPrefix {
    prefix: String,
}

impl KeyPrefix {
    pub fn new(prefix: impl AsRef<str>) -> Self {
        Self {
            prefix: prefix.as_ref().trim().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    pub fn apply(&self, key: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + key.len());
        out.push_str(&self.prefix);
        out.push_str(key);
        out
    }

    pub fn apply_all(&self, keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| self.apply(k)).collect()
    }

    /// Removes the prefix from a stored key. Keys without it are returned
    /// unchanged.
    pub fn strip(&self, key: String) -> String {
        if self.prefix.is_empty() {
            return key;
        }
        match key.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.to_string(),
            None => key,
        }
    }

    /// Glob pattern over stored keys. The prefix is matched literally, so
    /// metacharacters inside it never widen the match; an empty user pattern
    /// means `*`.
    pub fn pattern(&self, pattern: &str) -> String {
        let pattern = if pattern.is_empty() { "*" } else { pattern };
        let mut out = escape_glob(&self.prefix);
        out.push_str(pattern);
        out
    }
}

fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glob::GlobPattern;

    #[test]
    fn test_apply_and_strip() {
        let p = KeyPrefix::new("t1:");
        assert_eq!(p.apply("user"), "t1:user");
        assert_eq!(p.apply_all(&["a", "b"]), vec!["t1:a", "t1:b"]);
        assert_eq!(p.strip("t1:user".to_string()), "user");
        assert_eq!(p.strip("other".to_string()), "other");
    }

    #[test]
    fn test_empty_prefix_is_identity() {
        let p = KeyPrefix::new("  ");
        assert!(p.is_empty());
        assert_eq!(p.apply("k"), "k");
        assert_eq!(p.strip("k".to_string()), "k");
        assert_eq!(p.pattern(""), "*");
    }

    #[test]
    fn test_pattern_escapes_prefix() {
        let p = KeyPrefix::new("a*[x]:");
        let pat = GlobPattern::new(&p.pattern("k?"));
        assert!(pat.matches(b"a*[x]:k1"));
        assert!(!pat.matches(b"abc[x]:k1"));
        assert!(!pat.matches(b"ax:k1"));
    }
}
