use derive_more::{Display, From, Into};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Error;

/// Bearer access token issued by the identity service.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value for this token.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Refresh token issued at login. Persisted, never sent.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct RefreshToken(String);

impl RefreshToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RefreshToken(..)")
    }
}

/// User profile owned by the identity service.
///
/// Opaque: stored as received and replaced wholesale on update. A `null`
/// body is not a profile and fails to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, From, Into)]
#[serde(transparent)]
pub struct UserProfile(JsonValue);

impl<'de> Deserialize<'de> for UserProfile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match JsonValue::deserialize(deserializer)? {
            JsonValue::Null => Err(serde::de::Error::custom("user profile is null")),
            value => Ok(Self(value)),
        }
    }
}

impl UserProfile {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    #[must_use]
    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }
}

/// Request body forwarded verbatim to the identity service
/// (login credentials, registration data, profile changes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct Payload(JsonValue);

impl Payload {
    #[must_use]
    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }
}

/// Successful login response body.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct LoginResponse {
    pub access: AccessToken,
    pub refresh: RefreshToken,
    pub user: UserProfile,
}

/// Networked session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Operation {
    #[display("login")]
    Login,
    #[display("register")]
    Register,
    #[display("update profile")]
    UpdateProfile,
    #[display("change password")]
    ChangePassword,
}

impl Operation {
    /// Message reported when the service gives no reason of its own.
    #[must_use]
    pub fn fallback_message(self) -> &'static str {
        match self {
            Self::Login => "Login failed. Please try again.",
            Self::Register => "Registration failed. Please try again.",
            Self::UpdateProfile => "Profile update failed. Please try again.",
            Self::ChangePassword => "Password change failed. Please try again.",
        }
    }

    #[must_use]
    pub fn success_message(self) -> &'static str {
        match self {
            Self::Login => "Login successful!",
            Self::Register => "Registration successful! Please login.",
            Self::UpdateProfile => "Profile updated successfully!",
            Self::ChangePassword => "Password changed successfully!",
        }
    }
}

const PASSWORD_SPECIALS: &[char] = &['@', '$', '!', '%', '*', '?', '&'];

/// Password change form.
///
/// Only `current_password` and `new_password` go over the wire; the
/// confirmation exists for [`PasswordChange::validate`].
#[derive(Clone, Serialize)]
#[non_exhaustive]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    #[serde(skip)]
    pub confirm_password: String,
}

impl PasswordChange {
    #[must_use]
    pub fn new(
        current_password: impl Into<String>,
        new_password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) -> Self {
        Self {
            current_password: current_password.into(),
            new_password: new_password.into(),
            confirm_password: confirm_password.into(),
        }
    }

    /// Checks the form before it is submitted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] with the first rule the form breaks.
    pub fn validate(&self) -> Result<(), Error> {
        let fail = |msg: &str| Err(Error::Validation(msg.to_owned()));

        if self.current_password.is_empty() {
            return fail("Current password is required");
        }
        if self.new_password.is_empty() {
            return fail("New password is required");
        }
        if self.new_password.chars().count() < 8 {
            return fail("Password must be at least 8 characters");
        }
        if !is_strong_password(&self.new_password) {
            return fail(
                "Password must contain at least one uppercase letter, one lowercase letter, \
                 one number, and one special character",
            );
        }
        if self.confirm_password.is_empty() {
            return fail("Please confirm your password");
        }
        if self.confirm_password != self.new_password {
            return fail("Passwords do not match");
        }
        Ok(())
    }
}

impl std::fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordChange").finish_non_exhaustive()
    }
}

fn is_allowed_password_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(&c)
}

// Only the leading character is checked against the allowed set.
fn is_strong_password(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_lowercase())
        && s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars().any(|c| c.is_ascii_digit())
        && s.chars().any(|c| PASSWORD_SPECIALS.contains(&c))
        && s.chars().next().is_some_and(is_allowed_password_char)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn validation_message(form: &PasswordChange) -> String {
        match form.validate() {
            Err(Error::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn access_token_bearer_value() {
        let token = AccessToken::new("T");
        assert_eq!(token.bearer(), "Bearer T");
        assert_eq!(token.as_str(), "T");
    }

    #[test]
    fn tokens_do_not_leak_in_debug() {
        let token = AccessToken::new("secret-value");
        assert!(!format!("{token:?}").contains("secret-value"));
        let refresh = RefreshToken::new("secret-refresh");
        assert!(!format!("{refresh:?}").contains("secret-refresh"));
    }

    #[test]
    fn login_response_parses_service_body() {
        let body = json!({"access": "X", "refresh": "Y", "user": {"name": "Bob"}});
        let parsed: LoginResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.access.as_str(), "X");
        assert_eq!(parsed.refresh.as_str(), "Y");
        assert_eq!(parsed.user.get("name"), Some(&json!("Bob")));
    }

    #[test]
    fn login_response_requires_tokens() {
        let body = json!({"user": {"name": "Bob"}});
        assert!(serde_json::from_value::<LoginResponse>(body).is_err());
    }

    #[test]
    fn null_is_not_a_profile() {
        assert!(serde_json::from_value::<UserProfile>(json!(null)).is_err());
        let body = json!({"access": "X", "refresh": "Y", "user": null});
        assert!(serde_json::from_value::<LoginResponse>(body).is_err());
        let profile: UserProfile = serde_json::from_value(json!({})).unwrap();
        assert_eq!(profile.as_json(), &json!({}));
    }

    #[test]
    fn fallback_messages_are_fixed() {
        assert_eq!(Operation::Login.fallback_message(), "Login failed. Please try again.");
        assert_eq!(
            Operation::UpdateProfile.fallback_message(),
            "Profile update failed. Please try again."
        );
    }

    #[test]
    fn password_change_serializes_without_confirmation() {
        let form = PasswordChange::new("old", "N3w!pass", "N3w!pass");
        let body = serde_json::to_value(&form).unwrap();
        assert_eq!(body, json!({"current_password": "old", "new_password": "N3w!pass"}));
    }

    #[test]
    fn valid_password_change() {
        assert!(PasswordChange::new("old", "Str0ng!pw", "Str0ng!pw").validate().is_ok());
    }

    #[test]
    fn password_change_rules_in_order() {
        assert_eq!(
            validation_message(&PasswordChange::new("", "x", "x")),
            "Current password is required"
        );
        assert_eq!(
            validation_message(&PasswordChange::new("old", "", "")),
            "New password is required"
        );
        assert_eq!(
            validation_message(&PasswordChange::new("old", "Ab1!", "Ab1!")),
            "Password must be at least 8 characters"
        );
        assert!(
            validation_message(&PasswordChange::new("old", "alllowercase1!", "alllowercase1!"))
                .starts_with("Password must contain")
        );
        assert_eq!(
            validation_message(&PasswordChange::new("old", "Str0ng!pw", "")),
            "Please confirm your password"
        );
        assert_eq!(
            validation_message(&PasswordChange::new("old", "Str0ng!pw", "Str0ng!px")),
            "Passwords do not match"
        );
    }

    #[test]
    fn password_must_start_with_allowed_character() {
        let form = PasswordChange::new("old", " Str0ng!pw", " Str0ng!pw");
        assert!(form.validate().is_err());
        let form = PasswordChange::new("old", "Str0ng!pw ", "Str0ng!pw ");
        assert!(form.validate().is_ok());
    }
}
