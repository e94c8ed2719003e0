//! Name Resolution Pass
//!
//! Maps reference identifiers (and artifact seeds) to valid, unique Rust
//! function names:
//! - snake_case, with anything outside `[a-z0-9_]` folded to `_`
//! - a leading digit gets a `_` prefix, keywords a trailing `_`
//! - collisions probe `seed`, `seed1`, `seed2`, ...
//!
//! Runs BEFORE emission so every `$ref` in a body resolves to the same name.

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::diagnostics::Diagnostics;

/// Names the rendered module defines itself
const RESERVED: &[&str] = &["schemas", "ast", "check", "builtins", "Ast", "Annotations", "Literal", "Symbol"];

// =============================================================================
// Resolved Name Entry
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    /// The emitted identifier
    pub identifier: String,

    /// The reference name as it appears in `$ref`
    pub original: String,

    /// Whether the sanitized seed was already taken
    pub disambiguated: bool,
}

// =============================================================================
// Name Resolver
// =============================================================================

pub struct NameResolver {
    /// original -> resolved name entry
    resolved: IndexMap<String, ResolvedName>,

    /// Every identifier handed out so far
    taken: HashSet<String>,
}

impl NameResolver {
    pub fn new() -> Self {
        Self {
            resolved: IndexMap::new(),
            taken: RESERVED.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Resolve every name in order; renames are reported
    pub fn build<'a>(names: impl IntoIterator<Item = &'a str>, diagnostics: &mut Diagnostics) -> Self {
        let mut resolver = Self::new();
        for name in names {
            resolver.resolve(name, diagnostics);
        }
        resolver
    }

    /// The identifier for a reference, allocating one on first use
    pub fn resolve(&mut self, original: &str, diagnostics: &mut Diagnostics) -> String {
        if let Some(entry) = self.resolved.get(original) {
            return entry.identifier.clone();
        }
        let seed = sanitize(original);
        let identifier = self.probe(&seed);
        let disambiguated = identifier != seed;
        if identifier != original {
            diagnostics.identifier_renamed(original, &identifier, disambiguated);
        }
        self.resolved.insert(
            original.to_string(),
            ResolvedName {
                identifier: identifier.clone(),
                original: original.to_string(),
                disambiguated,
            },
        );
        identifier
    }

    /// A fresh identifier for an artifact; artifacts are never looked up by name
    pub fn fresh(&mut self, seed: &str) -> String {
        self.probe(&sanitize(seed))
    }

    fn probe(&mut self, seed: &str) -> String {
        let mut candidate = seed.to_string();
        let mut n = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{}{}", seed, n);
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.resolved.get(original).map(|r| r.identifier.as_str())
    }

    pub fn all_resolved(&self) -> impl Iterator<Item = &ResolvedName> {
        self.resolved.values()
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Casing
// =============================================================================

/// A valid Rust identifier for `s`
pub fn sanitize(s: &str) -> String {
    let snake = to_snake_case(s);
    let mut out = String::with_capacity(snake.len());
    for c in snake.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches('_');
    let mut out = if trimmed.is_empty() {
        "schema".to_string()
    } else {
        trimmed.to_string()
    };
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if is_rust_keyword(&out) {
        out.push('_');
    }
    out
}

/// `HTTPRequest` -> `http_request`, `userId` -> `user_id`
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let after_lower = prev.map_or(false, |p| p.is_ascii_lowercase() || p.is_ascii_digit());
            let acronym_end =
                prev.map_or(false, |p| p.is_ascii_uppercase()) && next.map_or(false, |n| n.is_ascii_lowercase());
            if after_lower || acronym_end {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else if c == '-' || c == ' ' || c == '.' || c == '/' {
            result.push('_');
        } else {
            result.push(c);
        }
    }
    result
}

fn is_rust_keyword(s: &str) -> bool {
    matches!(
        s,
        "as" | "break" | "const" | "continue" | "crate" | "else" | "enum" | "extern" | "false" | "fn" | "for"
            | "if" | "impl" | "in" | "let" | "loop" | "match" | "mod" | "move" | "mut" | "pub" | "ref"
            | "return" | "self" | "static" | "struct" | "super" | "trait" | "true" | "type" | "unsafe"
            | "use" | "where" | "while" | "async" | "await" | "dyn" | "abstract" | "become" | "box" | "do"
            | "final" | "macro" | "override" | "priv" | "typeof" | "unsized" | "virtual" | "yield" | "try"
            | "gen"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("UserProfile"), "user_profile");
        assert_eq!(to_snake_case("HTTPRequest"), "http_request");
        assert_eq!(to_snake_case("userId"), "user_id");
        assert_eq!(to_snake_case("my-type.v2"), "my_type_v2");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Type"), "type_");
        assert_eq!(sanitize("2fa"), "_2fa");
        assert_eq!(sanitize("a$b"), "a_b");
        assert_eq!(sanitize("--"), "schema");
    }

    #[test]
    fn test_collisions_probe_suffixes() {
        let mut diagnostics = Diagnostics::new();
        let resolver = NameResolver::build(["User", "user", "USER_", "schemas"], &mut diagnostics);
        assert_eq!(resolver.get("User"), Some("user"));
        assert_eq!(resolver.get("user"), Some("user1"));
        assert_eq!(resolver.get("USER_"), Some("user2"));
        assert_eq!(resolver.get("schemas"), Some("schemas1"));
        assert_eq!(diagnostics.warnings().count(), 3);
    }

    #[test]
    fn test_resolve_is_stable() {
        let mut diagnostics = Diagnostics::new();
        let mut resolver = NameResolver::new();
        let first = resolver.resolve("Tree", &mut diagnostics);
        assert_eq!(resolver.resolve("Tree", &mut diagnostics), first);
        assert_eq!(diagnostics.len(), 1);
    }
}
