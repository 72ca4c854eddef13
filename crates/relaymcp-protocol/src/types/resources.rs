//! Resource and resource-template descriptor types.

use serde::{Deserialize, Serialize};

/// Immutable resource descriptor advertised by `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource URI (exact key) or `None` when this entry is a template-only
    /// registration (see [`ResourceTemplateDescriptor`]).
    pub uri: String,
    /// Human-readable name
    pub name: String,
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource content
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A URI template registration, e.g. `file:///{path}`. Lookup for a concrete
/// URI tries exact keys first; templates are scanned only on miss, and the
/// first matching template wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTemplateDescriptor {
    /// RFC 6570-style template, restricted to `{name}` path segments
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    /// Human-readable name
    pub name: String,
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of resources matching this template
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A single piece of resource content returned by `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContent {
    /// The URI this content was read from
    pub uri: String,
    /// MIME type of the content
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// UTF-8 text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded binary content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl ResourceContent {
    /// Build a text resource content block.
    #[must_use]
    pub fn text(uri: impl Into<String>, mime_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: Some(mime_type.into()),
            text: Some(text.into()),
            blob: None,
        }
    }
}

/// Parses `{name}` path segments out of a URI template and matches them
/// against a concrete URI, extracting named bindings.
///
/// Literal path segments must match exactly; a `{name}` segment matches any
/// single non-`/` path segment. Returns `None` on structural mismatch
/// (differing segment counts or a literal mismatch).
#[must_use]
pub fn match_uri_template(template: &str, uri: &str) -> Option<std::collections::HashMap<String, String>> {
    let template_segments: Vec<&str> = template.split('/').collect();
    let uri_segments: Vec<&str> = uri.split('/').collect();
    if template_segments.len() != uri_segments.len() {
        return None;
    }

    let mut bindings = std::collections::HashMap::new();
    for (t_seg, u_seg) in template_segments.iter().zip(uri_segments.iter()) {
        if let Some(name) = t_seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            bindings.insert(name.to_string(), (*u_seg).to_string());
        } else if t_seg != u_seg {
            return None;
        }
    }
    Some(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_single_placeholder() {
        let bindings = match_uri_template("file:///{path}", "file:///notes.txt").unwrap();
        assert_eq!(bindings.get("path"), Some(&"notes.txt".to_string()));
    }

    #[test]
    fn rejects_literal_mismatch() {
        assert!(match_uri_template("db://{table}/rows", "fs://{table}/rows").is_none());
    }

    #[test]
    fn rejects_segment_count_mismatch() {
        assert!(match_uri_template("a/{b}", "a/b/c").is_none());
    }

    #[test]
    fn placeholder_never_crosses_a_slash() {
        // The naive split-and-zip approach means a placeholder segment can
        // only ever bind to a single path component; this pins that down.
        let bindings = match_uri_template("repo://{owner}/{name}", "repo://acme/widgets").unwrap();
        assert_eq!(bindings.get("owner"), Some(&"acme".to_string()));
        assert_eq!(bindings.get("name"), Some(&"widgets".to_string()));
    }
}
