//! Path traversal sanitizer
//!
//! Resolves a user-supplied path against an allowed root and rejects it
//! unless the normalized result is the root or lies beneath it. Resolution is
//! lexical: the filesystem is never consulted.
//!
//! Encoded traversal (percent-encoded or double-encoded dots and
//! separators), Windows separators and NUL bytes are rejected outright, even
//! when they would resolve inside the root, because a downstream consumer may
//! decode them differently.

use super::patterns::PatternSet;
use super::{require_text, Detection, Payload, SanitizeOptions, Sanitizer};
use crate::error::SanitizeError;
use crate::taint::{SanitizerKind, Taint};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

static PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::compile(&[
        ("dot_dot_traversal", r"(^|[/\\])\.\.([/\\]|$)"),
        ("null_byte", r"\x00"),
        ("windows_separator", r"\\"),
        ("url_encoded_traversal", r"(?i)%2e%2e|%2e\.|\.%2e"),
        ("double_encoded_traversal", r"(?i)%25(2e|2f|5c)"),
        ("encoded_forward_slash", r"(?i)%2f"),
        ("encoded_backslash", r"(?i)%5c"),
        ("home_dir_reference", r"^~"),
    ])
});

/// Patterns that reject a path no matter where it resolves.
const ALWAYS_REJECTED: &[&str] = &[
    "null_byte",
    "windows_separator",
    "url_encoded_traversal",
    "double_encoded_traversal",
    "encoded_forward_slash",
    "encoded_backslash",
];

/// Lexically normalize a path: drop `.` components and fold `..` into its
/// parent. `..` at the filesystem root stays at the root.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Resolve `input` under `root` and check containment.
///
/// Returns the path to hand to the sink: absolute inputs inside the root are
/// returned unchanged, relative inputs are returned joined and normalized.
pub fn resolve_within(root: &Path, input: &str) -> Result<PathBuf, SanitizeError> {
    let root = normalize_path(root);
    let candidate = Path::new(input);

    let (resolved, output) = if candidate.is_absolute() {
        (normalize_path(candidate), candidate.to_path_buf())
    } else {
        let joined = normalize_path(&root.join(candidate));
        (joined.clone(), joined)
    };

    if resolved.starts_with(&root) {
        Ok(output)
    } else {
        Err(SanitizeError::PathTraversal(format!(
            "{} resolves outside {}",
            input,
            root.display()
        )))
    }
}

/// Sanitizer for filesystem paths.
#[derive(Debug, Clone, Default)]
pub struct PathTraversalSanitizer;

impl PathTraversalSanitizer {
    /// Create a new path traversal sanitizer
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for PathTraversalSanitizer {
    fn kind(&self) -> SanitizerKind {
        SanitizerKind::PathTraversal
    }

    fn sanitize(
        &self,
        value: &Payload,
        taint: &Taint,
        opts: &SanitizeOptions,
    ) -> Result<(Payload, Taint), SanitizeError> {
        let text = require_text(self.kind(), value)?;
        let root = opts
            .allowed_root
            .as_ref()
            .ok_or(SanitizeError::MissingOption("allowed_root"))?;

        let matches = PATTERNS.matches(text);
        if let Some(pattern) = matches
            .iter()
            .find(|name| ALWAYS_REJECTED.contains(&name.as_str()))
        {
            tracing::warn!(pattern = %pattern, "Path rejected");
            return Err(SanitizeError::PathTraversal(pattern.clone()));
        }

        let resolved = resolve_within(root, text).inspect_err(|e| {
            tracing::warn!(root = %root.display(), error = %e, "Path escapes allowed root");
        })?;

        Ok((
            Payload::Text(resolved.to_string_lossy().into_owned()),
            taint.mark_sanitized(self.kind()),
        ))
    }

    fn detect(&self, value: &Payload) -> Detection {
        match value.as_text() {
            Some(text) => Detection::from_matches(PATTERNS.matches(text)),
            None => Detection::Safe(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(input: &str) -> Result<String, SanitizeError> {
        PathTraversalSanitizer::new()
            .sanitize(
                &input.into(),
                &Taint::unknown(),
                &SanitizeOptions::new().allowed_root("/srv/data"),
            )
            .map(|(value, _)| value.as_text().unwrap().to_string())
    }

    #[test]
    fn test_patterns_compile() {
        assert_eq!(PATTERNS.names().len(), 8);
    }

    #[test]
    fn test_requires_root() {
        let err = PathTraversalSanitizer::new()
            .sanitize(&"a".into(), &Taint::unknown(), &SanitizeOptions::default())
            .unwrap_err();
        assert_eq!(err, SanitizeError::MissingOption("allowed_root"));
    }

    #[test]
    fn test_relative_path_resolved() {
        assert_eq!(sanitize("reports/q1.csv").unwrap(), "/srv/data/reports/q1.csv");
        assert_eq!(sanitize("./a/../b.txt").unwrap(), "/srv/data/b.txt");
        assert_eq!(sanitize(".").unwrap(), "/srv/data");
    }

    #[test]
    fn test_absolute_inside_root_unchanged() {
        assert_eq!(sanitize("/srv/data/x.txt").unwrap(), "/srv/data/x.txt");
        assert_eq!(sanitize("/srv/data").unwrap(), "/srv/data");
    }

    #[test]
    fn test_traversal_rejected() {
        for input in [
            "../etc/passwd",
            "../../../../etc/passwd",
            "a/../../secret",
            "/etc/passwd",
            "/srv/data/../other",
            "/srv/database",
        ] {
            assert!(
                matches!(sanitize(input), Err(SanitizeError::PathTraversal(_))),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_encoded_traversal_rejected() {
        for input in [
            "%2e%2e/etc/passwd",
            "..%2fetc",
            "%252e%252e%252fetc",
            "..\\..\\windows",
            "a%5cb",
            "file\0.txt",
        ] {
            assert!(
                matches!(sanitize(input), Err(SanitizeError::PathTraversal(_))),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_accepted_paths_stay_contained() {
        let root = Path::new("/srv/data");
        for input in ["a", "a/b/../c", "./x/./y", "/srv/data/z", "~/notes"] {
            let out = sanitize(input).unwrap();
            assert!(normalize_path(Path::new(&out)).starts_with(root));
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("/../..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn test_detect() {
        let sanitizer = PathTraversalSanitizer::new();
        assert!(sanitizer.detect(&"docs/readme.md".into()).is_safe());

        let cases = [
            ("../etc", "dot_dot_traversal"),
            ("a/..", "dot_dot_traversal"),
            ("a\0", "null_byte"),
            ("a\\b", "windows_separator"),
            ("%2e%2e/x", "url_encoded_traversal"),
            ("%252e%252e", "double_encoded_traversal"),
            ("a%2fb", "encoded_forward_slash"),
            ("a%5Cb", "encoded_backslash"),
            ("~/.ssh/id_rsa", "home_dir_reference"),
        ];
        for (input, expected) in cases {
            assert!(
                sanitizer.detect(&input.into()).patterns().contains(&expected.to_string()),
                "{:?} should match {}",
                input,
                expected
            );
        }
    }
}
