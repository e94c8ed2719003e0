//! Diagnostics
//!
//! Collects warnings from lossy lowering passes (AST to Representation,
//! JSON Schema import, code generation) instead of failing them.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Representation ===
    /// A check with no data description (custom closure) was dropped
    DroppedCheck,
    /// An annotation with no JSON form was dropped
    DroppedAnnotation,
    /// A transformation or middleware link has no representation
    DroppedEncoding,
    /// A node feature with no JSON form (unregistered symbol, merge function)
    Unrepresentable,

    // === JSON Schema ===
    /// A keyword the importer does not understand
    IgnoredKeyword,
    /// `$ref` target not found in the definitions
    UnresolvedRef,

    // === Codegen ===
    /// A reference identifier was rewritten into a valid identifier
    IdentifierRenamed,
    /// Two references sanitized to the same identifier
    IdentifierCollision,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DroppedCheck => "W001",
            Self::DroppedAnnotation => "W002",
            Self::DroppedEncoding => "W003",
            Self::Unrepresentable => "W006",
            Self::IgnoredKeyword => "W004",
            Self::UnresolvedRef => "E001",
            Self::IdentifierRenamed => "I001",
            Self::IdentifierCollision => "W005",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::UnresolvedRef => Severity::Error,

            Self::DroppedCheck
            | Self::DroppedAnnotation
            | Self::DroppedEncoding
            | Self::Unrepresentable
            | Self::IgnoredKeyword
            | Self::IdentifierCollision => Severity::Warning,

            Self::IdentifierRenamed => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Where it happened: a reference identifier or a JSON pointer
    pub location: String,
    pub code: DiagnosticCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(location: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.location
        )?;
        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }
        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DiagnosticItem) {
        if item.severity() >= Severity::Warning {
            warn!(code = %item.code, location = %item.location, "{}", item.message);
        }
        self.items.push(item);
    }

    pub fn dropped_check(&mut self, location: impl Into<String>, label: &str) {
        self.push(DiagnosticItem::new(
            location,
            DiagnosticCode::DroppedCheck,
            format!("check '{}' has no data description and was dropped", label),
        ));
    }

    pub fn dropped_annotation(&mut self, location: impl Into<String>, key: &str) {
        self.push(DiagnosticItem::new(
            location,
            DiagnosticCode::DroppedAnnotation,
            format!("annotation '{}' is not JSON and was dropped", key),
        ));
    }

    pub fn dropped_encoding(&mut self, location: impl Into<String>) {
        self.push(DiagnosticItem::new(
            location,
            DiagnosticCode::DroppedEncoding,
            "encoding links cannot be represented; only the decoded type was kept",
        ));
    }

    pub fn unrepresentable(&mut self, location: impl Into<String>, what: &str) {
        self.push(DiagnosticItem::new(
            location,
            DiagnosticCode::Unrepresentable,
            format!("{} has no representation and was dropped", what),
        ));
    }

    pub fn ignored_keyword(&mut self, location: impl Into<String>, keyword: &str) {
        self.push(DiagnosticItem::new(
            location,
            DiagnosticCode::IgnoredKeyword,
            format!("unsupported keyword '{}' ignored", keyword),
        ));
    }

    pub fn unresolved_ref(&mut self, location: impl Into<String>, ref_target: &str) {
        self.push(DiagnosticItem::new(
            location,
            DiagnosticCode::UnresolvedRef,
            format!("$ref target '{}' not found in definitions", ref_target),
        ));
    }

    pub fn identifier_renamed(&mut self, original: &str, renamed: &str, collided: bool) {
        let code = if collided {
            DiagnosticCode::IdentifierCollision
        } else {
            DiagnosticCode::IdentifierRenamed
        };
        self.push(DiagnosticItem::new(
            original,
            code,
            format!("reference '{}' emitted as '{}'", original, renamed),
        ));
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn format_all(&self) -> String {
        self.items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self.errors().count();
        let warnings = self.warnings().count();
        writeln!(f, "{} error(s), {} warning(s)", errors, warnings)?;
        if !self.is_empty() {
            write!(f, "{}", self.format_all())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_counts() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.dropped_check("User.name", "custom");
        diagnostics.unresolved_ref("#/$defs/A", "#/$defs/B");
        diagnostics.identifier_renamed("my-type", "my_type", false);
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.errors().count(), 1);
        assert_eq!(diagnostics.warnings().count(), 1);
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_display_item() {
        let item = DiagnosticItem::new("A", DiagnosticCode::IgnoredKeyword, "unsupported keyword 'if' ignored")
            .with_context("at #/properties/x");
        let text = item.to_string();
        assert!(text.starts_with("[W004] warning: unsupported keyword 'if' ignored (A)"));
        assert!(text.ends_with("  - at #/properties/x"));
    }
}
