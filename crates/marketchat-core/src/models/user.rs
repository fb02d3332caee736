use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Client,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Worker => "worker",
        }
    }
}

/// Public-facing profile attached to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Profile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
}

/// Snapshot of the authenticated user as returned by the identity service.
/// Replaced wholesale on every fetch, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn is_worker(&self) -> bool {
        self.role == Role::Worker
    }

    /// Skills listed on the profile. Absent profile or absent list are both empty.
    pub fn skills(&self) -> &[String] {
        self.profile
            .as_ref()
            .and_then(|p| p.skills.as_deref())
            .unwrap_or(&[])
    }

    /// A worker is onboarded once at least one skill is listed.
    pub fn needs_onboarding(&self) -> bool {
        self.is_worker() && self.skills().is_empty()
    }

    /// Get display name, falling back to the email address
    pub fn display_name(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.full_name.as_deref())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

/// Partial profile edit sent with `PATCH profile`. Only set fields are sent.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_from_identity_service() {
        let json = r#"{"id":"6f1c2b7e-8d8a-4b9e-9b0a-2b6f0f1d2c3e","email":"ann@example.com","role":"worker","profile":{"full_name":"Ann Lee","skills":["plumbing","tiling"],"rating":"4.50"},"wallet":{"balance":"0.00"},"created_at":"2025-03-01T10:00:00Z"}"#;

        let user: UserProfile = serde_json::from_str(json).expect("Failed to parse user JSON");
        assert_eq!(user.role, Role::Worker);
        assert!(!user.email_verified); // missing field defaults to unverified
        assert_eq!(user.skills(), &["plumbing".to_string(), "tiling".to_string()]);
        assert!(!user.needs_onboarding());
        assert_eq!(user.display_name(), "Ann Lee");
    }

    #[test]
    fn test_skills_absent_counts_as_empty() {
        let user: UserProfile =
            serde_json::from_str(r#"{"id":"1","email":"w@example.com","role":"worker"}"#)
                .expect("Failed to parse user JSON");
        assert!(user.skills().is_empty());
        assert!(user.needs_onboarding());
        assert_eq!(user.display_name(), "w@example.com");

        let user: UserProfile = serde_json::from_str(
            r#"{"id":"1","email":"w@example.com","role":"worker","profile":{"skills":null}}"#,
        )
        .expect("Failed to parse user JSON");
        assert!(user.needs_onboarding());
    }

    #[test]
    fn test_client_never_needs_onboarding() {
        let user: UserProfile =
            serde_json::from_str(r#"{"id":"1","email":"c@example.com"}"#).expect("Failed to parse user JSON");
        assert_eq!(user.role, Role::Client);
        assert!(!user.needs_onboarding());
    }

    #[test]
    fn test_profile_update_skips_unset_fields() {
        let update = ProfileUpdate {
            skills: Some(vec!["carpentry".to_string()]),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).expect("Failed to serialize update");
        assert_eq!(json, serde_json::json!({"skills": ["carpentry"]}));
    }
}
