//! Document references and path parsing
//!
//! Every document is addressed as `workspace/scope/ref/version`. Path strings
//! are resolved by trying a fixed, ordered list of rules; the first match
//! wins. Caller defaults override matched parts, and fill in everything when
//! the path is a bare reference.

use crate::error::{PersistenceError, PersistenceResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version tag of documents without version history
pub const UNVERSIONED: &str = "__UNVERSIONED__";

/// The workspace backed by the key-value store
pub const GLOBAL_WORKSPACE: &str = "global";

/// Schema version assumed when stored data carries none
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0";

/// `git/<remote>:<owner>/<project>/<scope>/<path...>/<version>`
static GIT_REMOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(git/[a-zA-Z0-9_.-]+:[a-zA-Z0-9_.-]+/[a-zA-Z0-9_.-]+)/([a-zA-Z0-9_.]+)/([a-zA-Z0-9_.-]+(?:/[a-zA-Z0-9_.-]+)*)/([a-zA-Z0-9_.]+)$")
        .unwrap_or_else(|e| panic!("invalid git reference pattern: {e}"))
});

/// `<workspace>/<scope>/<ref>[/<ref>...]/<version>`
static NESTED_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z0-9_.-]+)/([a-zA-Z0-9_.]+)/([a-zA-Z0-9_.-]+[/a-zA-Z0-9_.-]*)/([a-zA-Z0-9_.]+)$")
        .unwrap_or_else(|e| panic!("invalid nested reference pattern: {e}"))
});

/// `<workspace>/<scope>/<ref>/<version...>`
static VERSIONED_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z0-9_.-]+)/([a-zA-Z0-9_.]+)/([a-zA-Z0-9_.-]+)/([/a-zA-Z0-9_.]+)$")
        .unwrap_or_else(|e| panic!("invalid versioned reference pattern: {e}"))
});

/// `<workspace>/<scope>/<ref>`
static UNVERSIONED_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z0-9_.-]+)/([a-zA-Z0-9_.]+)/([a-zA-Z0-9_.-]+)$")
        .unwrap_or_else(|e| panic!("invalid unversioned reference pattern: {e}"))
});

/// Whether `segment` names a plain directory entry
#[must_use]
pub fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains(['/', '\\'])
}

/// Fully resolved document address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Persistence domain
    pub workspace: String,
    /// Scope name
    pub scope: String,
    /// Document reference within the scope
    pub reference: String,
    /// Version tag
    pub version: String,
}

impl DocumentRef {
    /// Build a reference from its parts
    #[must_use]
    pub fn new(
        workspace: impl Into<String>,
        scope: impl Into<String>,
        reference: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            scope: scope.into(),
            reference: reference.into(),
            version: version.into(),
        }
    }

    /// Unversioned document in the global workspace
    #[must_use]
    pub fn global(scope: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::new(GLOBAL_WORKSPACE, scope, reference, UNVERSIONED)
    }

    /// Whether this addresses the unversioned tag
    #[inline]
    #[must_use]
    pub fn is_unversioned(&self) -> bool {
        self.version == UNVERSIONED
    }

    /// Whether this lives in the key-value backed workspace
    #[inline]
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.workspace == GLOBAL_WORKSPACE
    }

    /// Reject empty, `.` and `..` segments in any part
    ///
    /// Parts are joined onto directories by the file adapter, so every
    /// `/`-separated segment must name a plain child.
    ///
    /// # Errors
    /// [`PersistenceError::InvalidPath`] naming the offending reference.
    pub fn check(&self) -> PersistenceResult<()> {
        let parts = [&self.workspace, &self.scope, &self.reference, &self.version];
        if parts.iter().all(|part| part.split('/').all(is_plain_segment)) {
            Ok(())
        } else {
            Err(PersistenceError::InvalidPath(self.to_string()))
        }
    }

    /// Parse a path string without defaults
    ///
    /// # Errors
    /// [`PersistenceError::InvalidPath`] if no rule matches.
    pub fn parse(path: &str) -> PersistenceResult<Self> {
        Self::parse_with(path, &PathDefaults::default())
    }

    /// Parse a path string, applying caller defaults
    ///
    /// # Errors
    /// [`PersistenceError::InvalidPath`] if no rule matches, the defaults
    /// do not name a scope for a bare reference, or a segment is `.` or `..`.
    pub fn parse_with(path: &str, defaults: &PathDefaults) -> PersistenceResult<Self> {
        let doc = Self::match_rules(path, defaults)?;
        doc.check()?;
        Ok(doc)
    }

    fn match_rules(path: &str, defaults: &PathDefaults) -> PersistenceResult<Self> {
        if let Some(caps) = GIT_REMOTE
            .captures(path)
            .or_else(|| NESTED_REF.captures(path))
            .or_else(|| VERSIONED_REF.captures(path))
        {
            return Ok(defaults.apply(Self::new(&caps[1], &caps[2], &caps[3], &caps[4])));
        }

        if let Some(caps) = UNVERSIONED_REF.captures(path) {
            return Ok(defaults.apply(Self::new(&caps[1], &caps[2], &caps[3], UNVERSIONED)));
        }

        // `scope:ref`, the key-space form of a global document
        if let Some((scope, reference)) = path.split_once(':') {
            let plain = |s: &str| !s.is_empty() && !s.contains(['/', ',', ':']);
            if plain(scope) && plain(reference) {
                return Ok(defaults.apply(Self::global(scope, reference)));
            }
        }

        let usable = !path.is_empty() && !path.contains(['/', ',', ':']);
        match (&defaults.scope, usable) {
            (Some(scope), true) => Ok(Self::new(
                defaults.workspace.as_deref().unwrap_or(GLOBAL_WORKSPACE),
                scope,
                path,
                defaults.version.as_deref().unwrap_or(UNVERSIONED),
            )),
            _ => Err(PersistenceError::InvalidPath(path.to_string())),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.workspace, self.scope, self.reference, self.version
        )
    }
}

impl FromStr for DocumentRef {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Caller-supplied parts used when resolving a path string
///
/// Set parts replace whatever the path matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathDefaults {
    /// Workspace override
    pub workspace: Option<String>,
    /// Scope override; required for bare references
    pub scope: Option<String>,
    /// Version override
    pub version: Option<String>,
}

impl PathDefaults {
    /// No defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workspace
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Set the scope
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the version
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    fn apply(&self, mut reference: DocumentRef) -> DocumentRef {
        if let Some(workspace) = &self.workspace {
            reference.workspace.clone_from(workspace);
        }
        if let Some(scope) = &self.scope {
            reference.scope.clone_from(scope);
        }
        if let Some(version) = &self.version {
            reference.version.clone_from(version);
        }
        reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_versioned_path() {
        let r = DocumentRef::parse("global/Flow/f1/__UNVERSIONED__").unwrap();
        assert_eq!(r, DocumentRef::global("Flow", "f1"));
        assert_eq!(r.to_string(), "global/Flow/f1/__UNVERSIONED__");
    }

    #[test]
    fn parse_nested_reference() {
        let r = DocumentRef::parse("ws-1/Flow/lib/sub/f1/v2.0").unwrap();
        assert_eq!(r.workspace, "ws-1");
        assert_eq!(r.reference, "lib/sub/f1");
        assert_eq!(r.version, "v2.0");
    }

    #[test]
    fn parse_three_segments_is_unversioned() {
        let r = DocumentRef::parse("demo/Node/n1").unwrap();
        assert_eq!(r, DocumentRef::new("demo", "Node", "n1", UNVERSIONED));
        assert!(r.is_unversioned());
        assert!(!r.is_global());
    }

    #[test]
    fn parse_git_remote() {
        let path = "git/github.com:acme/robots/Flow/flows/pick/v1.2";
        let r = DocumentRef::parse(path).unwrap();
        assert_eq!(r.workspace, "git/github.com:acme/robots");
        assert_eq!(r.scope, "Flow");
        assert_eq!(r.reference, "flows/pick");
        assert_eq!(r.version, "v1.2");
        assert_eq!(r.to_string(), path);
    }

    #[test]
    fn bare_reference_needs_scope_default() {
        let err = DocumentRef::parse("n1").unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidPath(_)));

        let r = DocumentRef::parse_with("n1", &PathDefaults::new().with_scope("Node")).unwrap();
        assert_eq!(r, DocumentRef::global("Node", "n1"));
    }

    #[test]
    fn defaults_override_matched_parts() {
        let defaults = PathDefaults::new().with_scope("Node");
        let r = DocumentRef::parse_with("global/Other/n1/__UNVERSIONED__", &defaults).unwrap();
        assert_eq!(r.scope, "Node");
    }

    #[test]
    fn parse_key_space_form() {
        let r = DocumentRef::parse("Flow:f1").unwrap();
        assert_eq!(r, DocumentRef::global("Flow", "f1"));
        assert!(DocumentRef::parse("Flow:f1:x").is_err());
    }

    #[test]
    fn malformed_paths_are_rejected() {
        for path in ["", "a//b", "/Flow/f1", "a/b,c/d"] {
            assert!(DocumentRef::parse(path).is_err(), "{path}");
        }
        let defaults = PathDefaults::new().with_scope("Flow");
        assert!(DocumentRef::parse_with("a,b", &defaults).is_err());
    }

    #[test]
    fn dot_segments_are_rejected() {
        for path in [
            "demo/Node/../../../escaped/v1",
            "demo/Node/lib/./n1/v1",
            "../Node/n1",
            "demo/../n1/v1",
            "Node:..",
        ] {
            let err = DocumentRef::parse(path).unwrap_err();
            assert!(matches!(err, PersistenceError::InvalidPath(_)), "{path}");
        }
        let defaults = PathDefaults::new().with_scope("Node");
        assert!(DocumentRef::parse_with("..", &defaults).is_err());
        assert!(DocumentRef::parse_with("n1", &defaults.with_workspace("..")).is_err());

        assert!(DocumentRef::parse("demo/Node/n..1/v1.0").is_ok());
    }

    #[test]
    fn plain_segments() {
        assert!(is_plain_segment("n1"));
        assert!(is_plain_segment("..n1"));
        for segment in ["", ".", "..", "a/b", "a\\b"] {
            assert!(!is_plain_segment(segment), "{segment}");
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn display_parses_back(
                ws in "[a-z][a-z0-9_-]{0,8}",
                scope in "[A-Z][a-zA-Z]{0,8}",
                reference in "[a-z0-9][a-z0-9_.-]{0,8}",
                version in "[a-z0-9_][a-z0-9_.]{0,7}",
            ) {
                let r = DocumentRef::new(ws, scope, reference, version);
                prop_assert_eq!(DocumentRef::parse(&r.to_string()).unwrap(), r);
            }
        }
    }
}
