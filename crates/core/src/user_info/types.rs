//! User profile model and the response shapes it is normalized from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::Claims;

/// Normalized user profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl UserInfo {
    /// First and last name, else display name, else username.
    pub fn full_name(&self) -> String {
        if let (Some(first), Some(last)) = (non_empty(&self.first_name), non_empty(&self.last_name)) {
            return format!("{first} {last}");
        }
        non_empty(&self.display_name).map_or_else(|| self.username.clone(), str::to_string)
    }

    /// Minimal profile derived from token claims, no network involved.
    pub fn from_claims(claims: &Claims) -> Option<Self> {
        let username = claims
            .preferred_username
            .clone()
            .or_else(|| claims.name.clone())
            .or_else(|| claims.sub.clone())?;
        Some(Self {
            id: claims.id.clone().or_else(|| claims.sub.clone()).unwrap_or_else(|| username.clone()),
            display_name: claims.display_name.clone(),
            first_name: claims.given_name.clone(),
            last_name: claims.family_name.clone(),
            email: claims.email.clone(),
            avatar: claims.picture.clone(),
            organization: claims.owner.clone(),
            is_admin: claims.is_admin(),
            username,
        })
    }

    /// Fill empty fields from `other`.
    pub fn merge_missing(mut self, other: &Self) -> Self {
        fn fill(target: &mut Option<String>, source: &Option<String>) {
            if non_empty(target).is_none() {
                target.clone_from(source);
            }
        }
        if self.id.is_empty() {
            self.id.clone_from(&other.id);
        }
        if self.username.is_empty() {
            self.username.clone_from(&other.username);
        }
        fill(&mut self.display_name, &other.display_name);
        fill(&mut self.first_name, &other.first_name);
        fill(&mut self.last_name, &other.last_name);
        fill(&mut self.email, &other.email);
        fill(&mut self.avatar, &other.avatar);
        fill(&mut self.organization, &other.organization);
        self.is_admin |= other.is_admin;
        self
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// User record as returned by the identity provider's account APIs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountUser {
    pub owner: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub is_admin: bool,
}

/// OIDC userinfo document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcUserInfo {
    pub sub: Option<String>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

/// The known profile response shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileEnvelope {
    /// Account endpoint: `{status, data: user, data2: organization}`
    Account { data: Option<AccountUser>, data2: Option<Value> },
    /// Standard OIDC userinfo
    Oidc(OidcUserInfo),
    /// Get-user endpoint: `{status, data: user}`
    User { data: Option<AccountUser> },
}

impl ProfileEnvelope {
    /// Parse an account endpoint body. `data` that is not an object (older
    /// providers send `true` or `null`) carries no user.
    pub fn account_from_json(body: &Value) -> Self {
        Self::Account { data: user_object(body.get("data")), data2: body.get("data2").cloned() }
    }

    pub fn user_from_json(body: &Value) -> Self {
        Self::User { data: user_object(body.get("data")) }
    }

    pub fn oidc_from_json(body: &Value) -> Self {
        Self::Oidc(serde_json::from_value(body.clone()).unwrap_or_default())
    }

    /// Normalize into a [`UserInfo`], `None` if the response named no user.
    pub fn normalize(self) -> Option<UserInfo> {
        match self {
            Self::Account { data, data2 } => {
                let organization = data2
                    .as_ref()
                    .and_then(|org| org.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let mut info = from_account_user(data?)?;
                if info.organization.is_none() {
                    info.organization = organization;
                }
                Some(info)
            }
            Self::User { data } => from_account_user(data?),
            Self::Oidc(doc) => {
                let username = doc.preferred_username.or_else(|| doc.name.clone())?;
                Some(UserInfo {
                    id: doc.sub.unwrap_or_else(|| username.clone()),
                    display_name: doc.name,
                    first_name: doc.given_name,
                    last_name: doc.family_name,
                    email: doc.email,
                    avatar: doc.picture,
                    organization: None,
                    is_admin: false,
                    username,
                })
            }
        }
    }
}

fn user_object(value: Option<&Value>) -> Option<AccountUser> {
    value.filter(|v| v.is_object()).and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn from_account_user(user: AccountUser) -> Option<UserInfo> {
    let username = user.name.filter(|name| !name.is_empty())?;
    Some(UserInfo {
        id: user.id.filter(|id| !id.is_empty()).unwrap_or_else(|| username.clone()),
        display_name: user.display_name,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        avatar: user.avatar,
        organization: user.owner,
        is_admin: user.is_admin,
        username,
    })
}

/// Legacy signal some identity provider versions use for an expired session:
/// `status: "ok"` with empty `sub`/`name`, `data` of `true` or `null`, and a
/// null `data2`. Provider-version dependent, so callers treat it as a hint.
pub fn looks_like_silent_auth_failure(body: &Value) -> bool {
    let empty = |key: &str| body.get(key).and_then(Value::as_str).map_or(true, str::is_empty);
    body.get("status").and_then(Value::as_str) == Some("ok")
        && empty("sub")
        && empty("name")
        && matches!(body.get("data"), None | Some(Value::Null) | Some(Value::Bool(true)))
        && matches!(body.get("data2"), None | Some(Value::Null))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_full_name_priority() {
        let mut info = UserInfo { username: "jdoe".into(), ..UserInfo::default() };
        assert_eq!(info.full_name(), "jdoe");

        info.display_name = Some("Jane D.".into());
        assert_eq!(info.full_name(), "Jane D.");

        info.first_name = Some("Jane".into());
        assert_eq!(info.full_name(), "Jane D.");

        info.last_name = Some("Doe".into());
        assert_eq!(info.full_name(), "Jane Doe");
    }

    #[test]
    fn test_account_envelope_normalizes_user_and_org() {
        let body = json!({
            "status": "ok",
            "data": {"name": "jdoe", "id": "u-1", "firstName": "Jane", "lastName": "Doe", "isAdmin": true},
            "data2": {"name": "acme"}
        });

        let info = ProfileEnvelope::account_from_json(&body).normalize().unwrap();

        assert_eq!(info.id, "u-1");
        assert_eq!(info.username, "jdoe");
        assert_eq!(info.organization.as_deref(), Some("acme"));
        assert!(info.is_admin);
    }

    #[test]
    fn test_account_envelope_without_user_normalizes_to_none() {
        let body = json!({"status": "ok", "data": true, "data2": null});
        assert_eq!(ProfileEnvelope::account_from_json(&body).normalize(), None);
    }

    #[test]
    fn test_oidc_envelope() {
        let body = json!({"sub": "u-9", "preferred_username": "wall-e", "email": "w@example.com"});
        let info = ProfileEnvelope::oidc_from_json(&body).normalize().unwrap();
        assert_eq!(info.id, "u-9");
        assert_eq!(info.username, "wall-e");
    }

    #[test]
    fn test_silent_auth_failure_heuristic() {
        assert!(looks_like_silent_auth_failure(
            &json!({"status": "ok", "sub": "", "name": "", "data": true, "data2": null})
        ));
        assert!(looks_like_silent_auth_failure(&json!({"status": "ok", "data": null})));
        assert!(!looks_like_silent_auth_failure(
            &json!({"status": "ok", "sub": "u-1", "name": "jdoe", "data": {"name": "jdoe"}})
        ));
        assert!(!looks_like_silent_auth_failure(&json!({"status": "error", "msg": "denied"})));
    }

    #[test]
    fn test_merge_missing_keeps_remote_values() {
        let remote = UserInfo { id: "u-1".into(), username: "jdoe".into(), ..UserInfo::default() };
        let basic = UserInfo {
            id: "sub-1".into(),
            username: "jdoe".into(),
            email: Some("j@example.com".into()),
            ..UserInfo::default()
        };

        let merged = remote.merge_missing(&basic);
        assert_eq!(merged.id, "u-1");
        assert_eq!(merged.email.as_deref(), Some("j@example.com"));
    }
}
