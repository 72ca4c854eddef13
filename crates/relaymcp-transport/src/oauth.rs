//! The OAuth 2.1 subsystem: authorization code (with optional PKCE), client
//! credentials, and refresh-token grants over opaque UUID tokens, plus
//! revocation. Pluggable via [`TokenValidator`] and
//! [`ClientCredentialsValidator`] so embedders can swap in JWT/JWKS
//! verification or a real client registry without touching the dispatch
//! path.
//!
//! This subsystem is server-wide, not per-session: an authorization code
//! handed out over one connection is routinely exchanged over another, so
//! the code/token stores live here rather than on any one `Session`.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{TransportError, TransportResult};

const AUTH_CODE_TTL: Duration = Duration::from_secs(600);

/// Validates opaque bearer tokens. The default [`OAuthService`] token store
/// implements this directly; embedders may substitute JWT/JWKS-backed
/// validation behind the same trait.
pub trait TokenValidator: Send + Sync {
    /// Look up token info for a bearer token, or `None` if unknown/expired.
    fn validate(&self, token: &str) -> Option<TokenInfo>;
}

/// Validates a `client_credentials` grant's `client_id`/`client_secret`
/// pair. An opaque hook — this subsystem has no opinion on where client
/// secrets come from.
pub trait ClientCredentialsValidator: Send + Sync {
    /// Returns the scopes to grant, or `None` to reject the grant.
    fn validate(&self, client_id: &str, client_secret: &str) -> Option<Vec<String>>;
}

/// Info about a validated bearer token, handed back to the dispatcher to
/// populate a session's auth context.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// Client id (or user identifier) the token was issued to.
    pub client_id: String,
    /// Scopes granted to this token.
    pub scopes: Vec<String>,
}

struct AuthorizationCode {
    client_id: String,
    redirect_uri: String,
    scope: Vec<String>,
    code_challenge: Option<String>,
    expires_at: Instant,
    /// The session that requested this code, so it can be purged on
    /// disconnect (spec §3 `Session`: "pending OAuth authorization codes").
    owner_session: String,
}

#[derive(Clone)]
struct IssuedToken {
    client_id: String,
    scopes: Vec<String>,
    expires_at: Instant,
    refresh_token: Option<String>,
    /// The session the token was issued to (spec §3 `Session`: "issued
    /// access/refresh tokens"), purged on that session's disconnect (§4.2).
    owner_session: String,
}

/// Result of a successful `auth/token` call.
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Opaque access token (UUID).
    pub access_token: String,
    /// Seconds until `access_token` expires.
    pub expires_in: u64,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Opaque refresh token, present for grants that issue one.
    pub refresh_token: Option<String>,
}

const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// The server-wide OAuth 2.1 store: pending authorization codes and issued
/// tokens. All tokens are opaque UUIDs.
pub struct OAuthService {
    codes: DashMap<String, AuthorizationCode>,
    access_tokens: DashMap<String, IssuedToken>,
    refresh_to_access: DashMap<String, String>,
    client_credentials_validator: Option<Box<dyn ClientCredentialsValidator>>,
}

impl OAuthService {
    /// Construct a store with no client-credentials validator configured
    /// (that grant type always fails `invalid_client` until one is set).
    #[must_use]
    pub fn new() -> Self {
        Self {
            codes: DashMap::new(),
            access_tokens: DashMap::new(),
            refresh_to_access: DashMap::new(),
            client_credentials_validator: None,
        }
    }

    /// Install the client-credentials grant validator.
    #[must_use]
    pub fn with_client_credentials_validator(
        mut self,
        validator: impl ClientCredentialsValidator + 'static,
    ) -> Self {
        self.client_credentials_validator = Some(Box::new(validator));
        self
    }

    /// `auth/authorize`: issue a 10-minute authorization code bound to the
    /// requesting client, redirect uri, scope, and optional PKCE challenge.
    /// `owner_session` is the session that requested it, so the code can be
    /// purged if that session disconnects before exchanging it.
    pub fn authorize(
        &self,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: Vec<String>,
        code_challenge: Option<String>,
        owner_session: impl Into<String>,
    ) -> String {
        let code = Uuid::new_v4().to_string();
        self.codes.insert(
            code.clone(),
            AuthorizationCode {
                client_id: client_id.into(),
                redirect_uri: redirect_uri.into(),
                scope,
                code_challenge,
                expires_at: Instant::now() + AUTH_CODE_TTL,
                owner_session: owner_session.into(),
            },
        );
        code
    }

    /// `auth/token` with `grant_type=authorization_code`. Verifies
    /// `client_id`, `redirect_uri`, expiry, and (if PKCE was used) the
    /// verifier against the stored challenge. Codes are single-use: this
    /// removes the code whether or not the exchange ultimately succeeds.
    /// `owner_session` is the session performing the exchange and becomes
    /// the owner of the issued token pair.
    pub fn exchange_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
        owner_session: impl Into<String>,
    ) -> TransportResult<TokenPair> {
        let Some((_, entry)) = self.codes.remove(code) else {
            return Err(TransportError::Framing("invalid_grant: unknown or reused code".into()));
        };

        if entry.expires_at < Instant::now() {
            return Err(TransportError::Framing("invalid_grant: code expired".into()));
        }
        if entry.client_id != client_id {
            return Err(TransportError::Framing("invalid_client: client_id mismatch".into()));
        }
        if entry.redirect_uri != redirect_uri {
            return Err(TransportError::Framing("invalid_grant: redirect_uri mismatch".into()));
        }

        if let Some(challenge) = &entry.code_challenge {
            let Some(verifier) = code_verifier else {
                return Err(TransportError::Framing("invalid_grant: missing code_verifier".into()));
            };
            if !verify_s256(verifier, challenge) {
                return Err(TransportError::Framing("invalid_grant: PKCE verification failed".into()));
            }
        }

        Ok(self.issue_token(entry.client_id, entry.scope, owner_session.into()))
    }

    /// `auth/token` with `grant_type=client_credentials`.
    pub fn client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        owner_session: impl Into<String>,
    ) -> TransportResult<TokenPair> {
        let validator = self
            .client_credentials_validator
            .as_ref()
            .ok_or_else(|| TransportError::Framing("invalid_client: no validator configured".into()))?;

        let scopes = validator
            .validate(client_id, client_secret)
            .ok_or_else(|| TransportError::Framing("invalid_client: bad credentials".into()))?;

        Ok(self.issue_token(client_id.to_string(), scopes, owner_session.into()))
    }

    /// `auth/token` with `grant_type=refresh_token`: rotates the access
    /// token, preserving scopes, the refresh token itself, and the owning
    /// session.
    pub fn refresh(&self, refresh_token: &str) -> TransportResult<TokenPair> {
        let Some((_, old_access)) = self.refresh_to_access.remove(refresh_token) else {
            return Err(TransportError::Framing("invalid_grant: unknown refresh token".into()));
        };
        let Some((_, old_entry)) = self.access_tokens.remove(&old_access) else {
            return Err(TransportError::Framing("invalid_grant: refresh token has no backing access token".into()));
        };

        let new_access = Uuid::new_v4().to_string();
        self.access_tokens.insert(
            new_access.clone(),
            IssuedToken {
                client_id: old_entry.client_id.clone(),
                scopes: old_entry.scopes.clone(),
                expires_at: Instant::now() + ACCESS_TOKEN_TTL,
                refresh_token: Some(refresh_token.to_string()),
                owner_session: old_entry.owner_session.clone(),
            },
        );
        self.refresh_to_access.insert(refresh_token.to_string(), new_access.clone());

        Ok(TokenPair {
            access_token: new_access,
            expires_in: ACCESS_TOKEN_TTL.as_secs(),
            scopes: old_entry.scopes,
            refresh_token: Some(refresh_token.to_string()),
        })
    }

    /// `auth/revoke`: removes a matching access or refresh token. Always
    /// succeeds from the caller's point of view — never reveals whether
    /// the token existed.
    pub fn revoke(&self, token: &str) {
        if let Some((_, entry)) = self.access_tokens.remove(token) {
            if let Some(refresh) = entry.refresh_token {
                self.refresh_to_access.remove(&refresh);
            }
            return;
        }
        if let Some((refresh, access)) = self.refresh_to_access.remove(token) {
            self.access_tokens.remove(&access);
            let _ = refresh;
        }
    }

    /// Drop every pending authorization code and issued token owned by
    /// `session_id` (spec §3 `Session`, §4.2: disconnect "drops its OAuth
    /// code/token maps"). Called from `Dispatcher::teardown_session`.
    pub fn purge_session(&self, session_id: &str) {
        self.codes.retain(|_, entry| entry.owner_session != session_id);
        self.access_tokens.retain(|_, entry| entry.owner_session != session_id);
        self.refresh_to_access
            .retain(|_, access| self.access_tokens.contains_key(access));
    }

    fn issue_token(&self, client_id: String, scopes: Vec<String>, owner_session: String) -> TokenPair {
        let access_token = Uuid::new_v4().to_string();
        let refresh_token = Uuid::new_v4().to_string();

        self.access_tokens.insert(
            access_token.clone(),
            IssuedToken {
                client_id,
                scopes: scopes.clone(),
                expires_at: Instant::now() + ACCESS_TOKEN_TTL,
                refresh_token: Some(refresh_token.clone()),
                owner_session,
            },
        );
        self.refresh_to_access.insert(refresh_token.clone(), access_token.clone());

        TokenPair {
            access_token,
            expires_in: ACCESS_TOKEN_TTL.as_secs(),
            scopes,
            refresh_token: Some(refresh_token),
        }
    }
}

impl Default for OAuthService {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenValidator for OAuthService {
    fn validate(&self, token: &str) -> Option<TokenInfo> {
        let entry = self.access_tokens.get(token)?;
        if entry.expires_at < Instant::now() {
            return None;
        }
        Some(TokenInfo {
            client_id: entry.client_id.clone(),
            scopes: entry.scopes.clone(),
        })
    }
}

/// The static method→required-scope table.
#[must_use]
pub fn required_scope(method: &str) -> Option<&'static str> {
    let table: &[(&str, &str)] = &[
        ("tools/call", "tools:execute"),
        ("tools/list", "tools:read"),
        ("resources/read", "resources:read"),
        ("resources/list", "resources:read"),
        ("prompts/get", "prompts:read"),
        ("prompts/list", "prompts:read"),
    ];
    table
        .iter()
        .find(|(m, _)| *m == method)
        .map(|(_, scope)| *scope)
}

/// PKCE S256: `BASE64URL(SHA256(code_verifier)) == code_challenge`.
mod pkce {
    use base64::Engine;
    use sha2::{Digest, Sha256};

    pub fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
    }

    pub fn verify_s256(verifier: &str, challenge: &str) -> bool {
        challenge_for(verifier) == challenge
    }
}

use pkce::verify_s256;

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysValid;
    impl ClientCredentialsValidator for AlwaysValid {
        fn validate(&self, _client_id: &str, _client_secret: &str) -> Option<Vec<String>> {
            Some(vec!["tools:execute".to_string()])
        }
    }

    #[test]
    fn authorization_code_is_single_use() {
        let service = OAuthService::new();
        let code = service.authorize("client-1", "https://app/callback", vec!["tools:read".into()], None, "s1");

        let first = service.exchange_code(&code, "client-1", "https://app/callback", None, "s1");
        assert!(first.is_ok());

        let second = service.exchange_code(&code, "client-1", "https://app/callback", None, "s1");
        assert!(second.is_err());
    }

    #[test]
    fn exchange_rejects_client_id_mismatch() {
        let service = OAuthService::new();
        let code = service.authorize("client-1", "https://app/callback", vec![], None, "s1");
        let result = service.exchange_code(&code, "client-2", "https://app/callback", None, "s1");
        assert!(result.is_err());
    }

    #[test]
    fn pkce_challenge_must_match_verifier() {
        let service = OAuthService::new();
        let verifier = "verifier123";
        let challenge = pkce::challenge_for(verifier);
        let code = service.authorize("client-1", "https://app/callback", vec![], Some(challenge), "s1");

        assert!(service
            .exchange_code(&code, "client-1", "https://app/callback", Some("wrong-verifier"), "s1")
            .is_err());
    }

    #[test]
    fn pkce_challenge_succeeds_with_correct_verifier() {
        let service = OAuthService::new();
        let verifier = "verifier123";
        let challenge = pkce::challenge_for(verifier);
        let code = service.authorize("client-1", "https://app/callback", vec![], Some(challenge), "s1");

        assert!(service
            .exchange_code(&code, "client-1", "https://app/callback", Some(verifier), "s1")
            .is_ok());
    }

    #[test]
    fn refresh_rotates_access_token_and_keeps_refresh_token() {
        let service = OAuthService::new();
        let code = service.authorize("client-1", "https://app/callback", vec!["tools:read".into()], None, "s1");
        let tokens = service.exchange_code(&code, "client-1", "https://app/callback", None, "s1").unwrap();

        let refreshed = service.refresh(tokens.refresh_token.as_ref().unwrap()).unwrap();
        assert_ne!(refreshed.access_token, tokens.access_token);
        assert_eq!(refreshed.refresh_token, tokens.refresh_token);
        assert_eq!(refreshed.scopes, vec!["tools:read".to_string()]);
    }

    #[test]
    fn revoke_never_reveals_whether_token_existed() {
        let service = OAuthService::new();
        service.revoke("never-issued");
    }

    #[test]
    fn client_credentials_grant_uses_configured_validator() {
        let service = OAuthService::new().with_client_credentials_validator(AlwaysValid);
        let tokens = service.client_credentials("client-1", "secret", "s1").unwrap();
        assert_eq!(tokens.scopes, vec!["tools:execute".to_string()]);
    }

    #[test]
    fn client_credentials_without_validator_fails() {
        let service = OAuthService::new();
        assert!(service.client_credentials("client-1", "secret", "s1").is_err());
    }

    #[test]
    fn required_scope_table_matches_spec() {
        assert_eq!(required_scope("tools/call"), Some("tools:execute"));
        assert_eq!(required_scope("resources/read"), Some("resources:read"));
        assert_eq!(required_scope("initialize"), None);
    }

    #[test]
    fn purge_session_drops_its_codes_and_tokens_only() {
        let service = OAuthService::new();
        // s1: one issued token, one still-pending (unexchanged) code.
        let exchanged_code = service.authorize("client-1", "https://app/callback", vec![], None, "s1");
        let tokens_s1 = service
            .exchange_code(&exchanged_code, "client-1", "https://app/callback", None, "s1")
            .unwrap();
        let pending_code_s1 = service.authorize("client-1", "https://app/callback", vec![], None, "s1");
        // s2: its own pending code, untouched by s1's teardown.
        let pending_code_s2 = service.authorize("client-1", "https://app/callback", vec![], None, "s2");

        service.purge_session("s1");

        assert!(service.validate(&tokens_s1.access_token).is_none());
        assert!(service
            .exchange_code(&pending_code_s1, "client-1", "https://app/callback", None, "s1")
            .is_err());
        assert!(service
            .exchange_code(&pending_code_s2, "client-1", "https://app/callback", None, "s2")
            .is_ok());
    }
}
