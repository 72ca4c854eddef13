//! Protocol version negotiation.
//!
//! The server advertises an ordered list, newest first. Negotiation picks
//! the client's requested version if supported; otherwise the newest
//! supported version that is lexicographically `<=` the client's requested
//! version (the `YYYY-MM-DD` form sorts lexicographically by date); if no
//! such version exists, negotiation fails.

use crate::error::{ErrorKind, McpError};

/// Versions this runtime understands, newest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

/// Negotiate a protocol version for a client's requested `protocolVersion`.
pub fn negotiate(requested: &str) -> Result<&'static str, McpError> {
    if let Some(exact) = SUPPORTED_VERSIONS.iter().find(|v| **v == requested) {
        return Ok(exact);
    }

    SUPPORTED_VERSIONS
        .iter()
        .filter(|v| **v <= requested)
        .max()
        .copied()
        .ok_or_else(|| {
            McpError::new(
                ErrorKind::IncompatibleVersion,
                format!(
                    "unsupported protocol version '{requested}'; server supports {SUPPORTED_VERSIONS:?}"
                ),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiates_exact_match() {
        assert_eq!(negotiate("2024-11-05").unwrap(), "2024-11-05");
    }

    #[test]
    fn negotiates_newest_when_client_is_ahead() {
        assert_eq!(negotiate("2026-01-01").unwrap(), "2025-03-26");
    }

    #[test]
    fn falls_back_to_latest_not_exceeding_client() {
        // Client asks for something between the two supported versions.
        assert_eq!(negotiate("2025-01-01").unwrap(), "2024-11-05");
    }

    #[test]
    fn fails_when_client_predates_everything_supported() {
        assert!(negotiate("2020-01-01").is_err());
    }

    proptest::proptest! {
        /// Negotiation never returns a version the server doesn't support.
        #[test]
        fn negotiated_version_is_always_supported(requested in "[0-9]{4}-[0-9]{2}-[0-9]{2}") {
            if let Ok(chosen) = negotiate(&requested) {
                proptest::prop_assert!(SUPPORTED_VERSIONS.contains(&chosen));
            }
        }

        /// Requesting a version we advertise always negotiates to itself.
        #[test]
        fn exact_supported_version_round_trips(idx in 0..SUPPORTED_VERSIONS.len()) {
            let requested = SUPPORTED_VERSIONS[idx];
            proptest::prop_assert_eq!(negotiate(requested).unwrap(), requested);
        }
    }
}
