//! Token Validator (§4.1). Pure aside from reading the process-wide signing
//! secret: same token + same secret always yields the same decision.

use std::collections::HashSet;

use chat_core::types::AuthContext;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing bearer token")]
    Missing,
    #[error("token has expired")]
    Expired,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token is not an access token")]
    BadType,
    #[error("token is malformed")]
    BadShape,
    #[error("token is missing required claim: {0}")]
    MissingClaim(String),
}

/// Raw wire claims. Every field is optional at the deserialization layer so
/// a missing required claim surfaces as [`ValidationError::MissingClaim`]
/// rather than a generic shape failure.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    org_id: Option<String>,
    exp: Option<i64>,
    iat: Option<i64>,
    scope: Option<String>,
    username: Option<String>,
    email: Option<String>,
    #[serde(rename = "type")]
    token_type: Option<String>,
}

/// Verify signature and claims, returning an [`AuthContext`] on success.
/// Audience is deliberately not validated — the same token is accepted
/// across the chat backend and its siblings (§4.1).
pub fn validate(token: &str, secret: &[u8]) -> Result<AuthContext, ValidationError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // We check expiry ourselves below so a stale token maps to the specific
    // `Expired` variant rather than a generic jsonwebtoken error.
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let key = DecodingKey::from_secret(secret);
    let data = decode::<RawClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => ValidationError::BadSignature,
        _ => ValidationError::BadShape,
    })?;
    let claims = data.claims;

    if claims.token_type.as_deref() != Some("access") {
        return Err(ValidationError::BadType);
    }

    let exp = claims
        .exp
        .ok_or_else(|| ValidationError::MissingClaim("exp".to_string()))?;
    if exp <= chrono::Utc::now().timestamp() {
        return Err(ValidationError::Expired);
    }

    let user_id = claims
        .sub
        .ok_or_else(|| ValidationError::MissingClaim("sub".to_string()))?;
    let org_id = claims
        .org_id
        .ok_or_else(|| ValidationError::MissingClaim("org_id".to_string()))?;

    let scopes = claims
        .scope
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_else(HashSet::new);

    Ok(AuthContext {
        user_id,
        org_id,
        scopes,
        username: claims.username,
        email: claims.email,
        issued_at: claims.iat,
        expires_at: Some(exp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[derive(Serialize)]
    struct TestClaims {
        sub: &'static str,
        org_id: &'static str,
        exp: i64,
        #[serde(rename = "type")]
        token_type: &'static str,
        scope: &'static str,
    }

    fn make_token(exp_offset_secs: i64, token_type: &'static str) -> String {
        let claims = TestClaims {
            sub: "u1",
            org_id: "o1",
            exp: chrono::Utc::now().timestamp() + exp_offset_secs,
            token_type,
            scope: "chat:write chat:read",
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    #[test]
    fn valid_access_token_produces_auth_context() {
        let token = make_token(3600, "access");
        let ctx = validate(&token, SECRET).unwrap();
        assert_eq!(ctx.user_id, "u1");
        assert_eq!(ctx.org_id, "o1");
        assert!(ctx.has_scope("chat:write"));
        assert!(ctx.has_scope("chat:read"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = make_token(-10, "access");
        assert_eq!(validate(&token, SECRET), Err(ValidationError::Expired));
    }

    #[test]
    fn refresh_token_type_is_rejected() {
        let token = make_token(3600, "refresh");
        assert_eq!(validate(&token, SECRET), Err(ValidationError::BadType));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = make_token(3600, "access");
        assert_eq!(
            validate(&token, b"different-secret-that-is-also-long"),
            Err(ValidationError::BadSignature)
        );
    }

    #[test]
    fn same_token_same_secret_is_deterministic() {
        let token = make_token(3600, "access");
        let a = validate(&token, SECRET);
        let b = validate(&token, SECRET);
        assert_eq!(a.unwrap().user_id, b.unwrap().user_id);
    }
}
