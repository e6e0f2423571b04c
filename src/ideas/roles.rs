use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::Collection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Submitter,
    Reviewer,
    Trainer,
    Admin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitter => "submitter",
            Self::Reviewer => "reviewer",
            Self::Trainer => "trainer",
            Self::Admin => "admin",
        }
    }

    pub fn allows(self, action: Action) -> bool {
        matches!(
            (self, action),
            (Self::Admin, _)
                | (Self::Submitter, Action::Submit)
                | (Self::Reviewer, Action::Review)
                | (Self::Trainer, Action::Train)
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "submitter" => Ok(Self::Submitter),
            "reviewer" => Ok(Self::Reviewer),
            "trainer" => Ok(Self::Trainer),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("unknown role `{raw}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Submit,
    Review,
    Train,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Review => "review",
            Self::Train => "train",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Access denied. User `{0}` not found in roles.json")]
    UnknownIdentity(String),
    #[error("User `{identity}` has unknown role `{role}`")]
    UnknownRole { identity: String, role: String },
    #[error("Role `{role}` of `{identity}` may not {}", .action.as_str())]
    Forbidden {
        identity: String,
        role: Role,
        action: Action,
    },
}

/// Identity to role assignments. Kept as raw strings so one bad entry does
/// not make the whole table unreadable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleTable {
    roles: BTreeMap<String, String>,
}

impl Collection for RoleTable {
    const FILE_NAME: &'static str = "roles.json";
}

impl RoleTable {
    /// Sample assignments written by `crewdesk init` when no role table
    /// exists yet.
    pub fn starter() -> Self {
        [
            ("michael", "submitter"),
            ("alice", "reviewer"),
            ("bob", "trainer"),
        ]
        .into_iter()
        .collect()
    }

    pub fn role_of(&self, identity: &str) -> Result<Role, AccessError> {
        let raw = self
            .roles
            .get(identity)
            .ok_or_else(|| AccessError::UnknownIdentity(identity.to_string()))?;
        raw.parse().map_err(|_| AccessError::UnknownRole {
            identity: identity.to_string(),
            role: raw.clone(),
        })
    }

    pub fn authorize(&self, identity: &str, action: Action) -> Result<Role, AccessError> {
        let role = self.role_of(identity)?;
        if !role.allows(action) {
            return Err(AccessError::Forbidden {
                identity: identity.to_string(),
                role,
                action,
            });
        }
        Ok(role)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RoleTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            roles: iter
                .into_iter()
                .map(|(identity, role)| (identity.into(), role.into()))
                .collect(),
        }
    }
}
