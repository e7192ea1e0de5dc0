use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Platform role attached to an authenticated user.
///
/// Roles are a closed set; the wire representation is the lowercase string
/// used by the identity provider's metadata and by the `profiles` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Content creator publishing courses.
    Producer,
    /// Owner of a client company account.
    Company,
    /// Employee-level user belonging to a company.
    Collaborator,
    /// Plain student; also the default when no role is recorded.
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Company => "company",
            Role::Collaborator => "collaborator",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "producer" => Ok(Role::Producer),
            "company" => Ok(Role::Company),
            "collaborator" => Ok(Role::Collaborator),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Typed view of the identity provider's user metadata bag.
///
/// The provider stores metadata as free-form JSON; it is converted to this
/// structure once, at the provider boundary, and stays typed from there on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserMetadata {
    /// Convert the provider's raw metadata JSON into the typed structure.
    ///
    /// An unrecognized role string is treated as absent rather than failing
    /// the whole conversion, since the role defaults to student downstream.
    pub fn from_value(value: &Value) -> Self {
        let role = match value.get("role").and_then(Value::as_str) {
            Some(raw) => match raw.parse::<Role>() {
                Ok(role) => Some(role),
                Err(_) => {
                    warn!(role = raw, "Ignoring unrecognized role in user metadata");
                    None
                }
            },
            None => None,
        };

        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            role,
            company_id: field("company_id"),
            company_name: field("company_name"),
            name: field("name"),
        }
    }
}

/// Partial metadata update sent to the identity provider.
///
/// Absent fields are left untouched; `Some(None)` serializes to an explicit
/// null so a stale company linkage can actually be cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Option<String>>,
}

impl MetadataPatch {
    /// Patch that only sets the role.
    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    /// Patch that sets the role together with a company linkage.
    pub fn company_link(role: Role, company_id: &str, company_name: &str) -> Self {
        Self {
            role: Some(role),
            company_id: Some(Some(company_id.to_string())),
            company_name: Some(Some(company_name.to_string())),
            ..Self::default()
        }
    }
}

/// Authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub metadata: UserMetadata,
}

/// Bearer-token pair plus expiry, representing an authenticated identity.
///
/// Tokens are opaque; the provider owns their format and lifetime. The
/// gateway only ever compares `expires_at` against the clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as a unix timestamp in seconds.
    pub expires_at: i64,
    pub user: AuthUser,
}

impl Session {
    /// Seconds until expiry; negative once the session has lapsed.
    pub fn remaining_secs(&self) -> i64 {
        self.expires_at - Utc::now().timestamp()
    }
}

/// Client company row from the `companies` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub contact_email: String,
    /// Back-reference to the auth user who owns this company, once linked.
    pub auth_user_id: Option<String>,
    #[serde(default)]
    pub needs_password_change: bool,
    #[serde(default)]
    pub subscription_plan_id: Option<String>,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
    #[serde(default)]
    pub seat_limit: Option<u32>,
}

/// Collaborator row from the `company_users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyUser {
    pub id: String,
    pub company_id: String,
    pub auth_user_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub needs_password_change: bool,
}

/// Mirror row from the `profiles` table, maintained by a database trigger.
/// Read-only from the gateway's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub role: Option<Role>,
    pub name: Option<String>,
    pub email: Option<String>,
}
