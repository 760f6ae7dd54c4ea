use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

const MAX_NAME_LEN: usize = 128;
const MAX_EMAIL_LEN: usize = 254;

fn validate_simple_name(value: &str, kind: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidId(format!("{kind} must not be empty")));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(Error::InvalidId(format!(
            "{kind} length must be <= {MAX_NAME_LEN}"
        )));
    }
    if !trimmed.chars().all(is_allowed_name_char) {
        return Err(Error::InvalidId(format!(
            "{kind} contains invalid characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn is_allowed_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, ':' | '_' | '-')
}

macro_rules! define_id_type {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a validated identifier.
            pub fn new(value: impl AsRef<str>) -> Result<Self> {
                validate_simple_name(value.as_ref(), $kind).map(Self)
            }

            /// Creates an identifier from a trusted string without validation.
            pub fn from_string(value: String) -> Self {
                Self(value)
            }

            /// Returns the underlying string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::from_string(value)
            }
        }
    };
}

define_id_type!(
    /// Principal identifier, issued by the external session layer.
    PrincipalId,
    "principal id"
);
define_id_type!(
    /// Owned resource identifier.
    ResourceId,
    "resource id"
);
define_id_type!(
    /// Organization identifier.
    OrgId,
    "organization id"
);
define_id_type!(
    /// Role name.
    RoleName,
    "role name"
);
define_id_type!(
    /// Permission name.
    PermissionName,
    "permission name"
);

impl ResourceId {
    /// Generates a fresh random resource identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl OrgId {
    /// Generates a fresh random organization identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Normalized email address of a principal or invitee.
///
/// Construction trims surrounding whitespace and lowercases the value so
/// comparisons between session-layer emails and stored invitations are
/// case-insensitive.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parses and normalizes an email address.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let normalized = value.as_ref().trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(Error::Validation("email must not be empty".to_string()));
        }
        if normalized.len() > MAX_EMAIL_LEN {
            return Err(Error::Validation(format!(
                "email length must be <= {MAX_EMAIL_LEN}"
            )));
        }
        let Some((local, domain)) = normalized.split_once('@') else {
            return Err(Error::Validation(
                "email must contain a single @".to_string(),
            ));
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(Error::Validation("email has an invalid shape".to_string()));
        }
        Ok(Self(normalized))
    }

    /// Creates an email address from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for EmailAddress {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

/// Single-use invitation token.
///
/// Tokens are random UUIDs, never derived from the invitation contents.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct InvitationToken(String);

impl InvitationToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a token from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvitationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InvitationToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for InvitationToken {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{EmailAddress, InvitationToken, PrincipalId, RoleName};

    #[test]
    fn principal_id_accepts_simple_names() {
        let principal = PrincipalId::new("user_1").expect("principal id");
        assert_eq!(principal.as_str(), "user_1");
    }

    #[test]
    fn role_name_rejects_invalid_chars() {
        let err = RoleName::new("ad min").expect_err("must reject");
        assert!(err.to_string().contains("role name"));
    }

    #[test]
    fn role_name_rejects_empty() {
        let err = RoleName::new("   ").expect_err("must reject");
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn email_normalizes_case_and_whitespace() {
        let email = EmailAddress::new("  B@X.Com ").expect("email");
        assert_eq!(email.as_str(), "b@x.com");
    }

    #[test]
    fn email_rejects_missing_at() {
        let err = EmailAddress::new("not-an-email").expect_err("must reject");
        assert!(err.to_string().contains("@"));
    }

    #[test]
    fn email_rejects_empty_domain() {
        assert!(EmailAddress::new("user@").is_err());
        assert!(EmailAddress::new("@x.com").is_err());
    }

    #[test]
    fn tokens_are_unique() {
        let a = InvitationToken::generate();
        let b = InvitationToken::generate();
        assert_ne!(a, b);
    }
}
