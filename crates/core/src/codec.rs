//! Compact token decoding.
//!
//! Tokens are split into header and payload without checking the signature.
//! That is the trust boundary of this crate: nothing here proves a token is
//! genuine. Authenticity is established by the identity provider when a token
//! is issued or refreshed, and by the remote authorization API
//! ([`crate::ports::AuthorizationValidator`]) when a caller needs it. Claims
//! read locally only drive UX decisions such as when to refresh.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::ports::IdentityProvider;

/// Header and payload of a compact token.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    pub header: Value,
    pub payload: Value,
}

impl DecodedToken {
    pub fn claims(&self) -> Claims {
        Claims::from_payload(&self.payload)
    }
}

/// Decode with the provider's own parser first, then the built-in one.
pub fn decode_with(provider: &dyn IdentityProvider, token: &str) -> Option<DecodedToken> {
    provider.parse_access_token(token).or_else(|| decode(token))
}

/// Split a `header.payload.signature` token and decode the first two parts.
///
/// Returns `None` unless the token has exactly three segments. A segment that
/// is not valid base64url JSON decodes to an empty object.
pub fn decode(token: &str) -> Option<DecodedToken> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 || segments[0].is_empty() || segments[1].is_empty() {
        return None;
    }

    Some(DecodedToken { header: decode_segment(segments[0]), payload: decode_segment(segments[1]) })
}

/// Build an unsigned `header.payload.` token, for fixtures and local
/// development identity providers.
pub fn encode_unsigned(header: &Value, payload: &Value) -> String {
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

fn decode_segment(segment: &str) -> Value {
    let trimmed = segment.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(trimmed).or_else(|_| STANDARD_NO_PAD.decode(trimmed));

    match bytes.ok().and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok()) {
        Some(value @ Value::Object(_)) => value,
        _ => Value::Object(Map::new()),
    }
}

/// Typed view of the claims the session layer reads.
///
/// Extraction is lenient: a claim of an unexpected type is treated as absent
/// rather than failing the whole token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    pub sub: Option<String>,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub iss: Option<String>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub owner: Option<String>,
    pub id: Option<String>,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    pub admin_claim: bool,
}

impl Claims {
    pub fn from_payload(payload: &Value) -> Self {
        let string = |key: &str| {
            payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
        };
        let number = |key: &str| {
            payload.get(key).and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        };

        let mut roles = names(payload.get("roles"));
        if let Some(role) = string("role") {
            roles.push(role);
        }

        Self {
            sub: string("sub"),
            exp: number("exp"),
            iat: number("iat"),
            iss: string("iss"),
            name: string("name"),
            preferred_username: string("preferred_username"),
            display_name: string("displayName"),
            given_name: string("given_name").or_else(|| string("firstName")),
            family_name: string("family_name").or_else(|| string("lastName")),
            email: string("email"),
            picture: string("picture").or_else(|| string("avatar")),
            owner: string("owner"),
            id: string("id"),
            roles,
            groups: names(payload.get("groups")),
            admin_claim: payload.get("isAdmin").and_then(Value::as_bool).unwrap_or(false),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
    }

    /// Seconds left before `exp`, negative once expired.
    pub fn seconds_remaining(&self, now_secs: i64) -> Option<i64> {
        self.exp.map(|exp| exp - now_secs)
    }

    pub fn is_admin(&self) -> bool {
        self.admin_claim
            || self.roles.iter().any(|role| role.eq_ignore_ascii_case("admin"))
            || self
                .groups
                .iter()
                .any(|group| group.eq_ignore_ascii_case("admin") || group.ends_with("/admin"))
    }
}

/// Accept arrays of strings or of objects carrying a `name`.
fn names(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.as_str().or_else(|| item.get("name").and_then(Value::as_str))
                })
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    //! Unit tests for codec.
    use serde_json::json;

    use super::*;

    /// Validates `decode` for the encode-then-decode scenario.
    ///
    /// Assertions:
    /// - Confirms header and payload come back unchanged.
    #[test]
    fn test_decode_recovers_header_and_payload() {
        let header = json!({"alg": "RS256", "typ": "JWT", "kid": "k1"});
        let payload = json!({"sub": "u-1", "exp": 1_900_000_000, "name": "jane"});
        let token = format!("{}signature", encode_unsigned(&header, &payload));

        let decoded = decode(&token).unwrap();

        assert_eq!(decoded.header, header);
        assert_eq!(decoded.payload, payload);
    }

    /// Validates `decode` for structurally invalid tokens.
    ///
    /// Assertions:
    /// - Ensures tokens without exactly three segments decode to `None`.
    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        assert!(decode("").is_none());
        assert!(decode("abc").is_none());
        assert!(decode("a.b").is_none());
        assert!(decode("a.b.c.d").is_none());
    }

    /// Validates `decode` for the per-segment failure scenario.
    ///
    /// Assertions:
    /// - Ensures a garbage header yields `{}` while the payload survives.
    #[test]
    fn test_bad_segment_yields_empty_object() {
        let payload = json!({"sub": "u-1"});
        let good = encode_unsigned(&json!({}), &payload);
        let payload_segment = good.split('.').nth(1).unwrap();
        let token = format!("!!!not-base64!!!.{payload_segment}.sig");

        let decoded = decode(&token).unwrap();

        assert_eq!(decoded.header, json!({}));
        assert_eq!(decoded.payload, payload);
    }

    /// Validates `decode` tolerates padded segments.
    #[test]
    fn test_padded_segments_accepted() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"abc"}"#);
        let decoded = decode(&format!("{header}.{payload}.")).unwrap();
        assert_eq!(decoded.claims().sub.as_deref(), Some("abc"));
    }

    /// Validates `Claims::from_payload` leniency and admin detection.
    ///
    /// Assertions:
    /// - Ensures role objects and strings are both read.
    /// - Ensures wrongly typed claims are ignored.
    #[test]
    fn test_claims_extraction() {
        let claims = Claims::from_payload(&json!({
            "sub": "u-1",
            "exp": 1_900_000_000.0,
            "name": 42,
            "roles": [{"name": "editor"}, "viewer"],
            "groups": ["acme/admin"],
            "firstName": "Jane",
        }));

        assert_eq!(claims.exp, Some(1_900_000_000));
        assert_eq!(claims.name, None);
        assert_eq!(claims.roles, vec!["editor".to_string(), "viewer".to_string()]);
        assert_eq!(claims.given_name.as_deref(), Some("Jane"));
        assert!(claims.is_admin());
        assert_eq!(claims.seconds_remaining(1_899_999_900), Some(100));
    }
}
