use std::fmt;

use serde::{Deserialize, Serialize};

/// Access state of a tenant database, derived from its persisted flags.
///
/// Precedence is `deleted` > `admin_disabled` > `disabled`, so an operator lock
/// always wins over whatever the user last asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    Active,
    UserDisabled,
    AdminDisabled,
    Deleted,
}

impl AccessState {
    #[must_use]
    pub const fn from_flags(disabled: bool, admin_disabled: bool, deleted: bool) -> Self {
        if deleted {
            Self::Deleted
        } else if admin_disabled {
            Self::AdminDisabled
        } else if disabled {
            Self::UserDisabled
        } else {
            Self::Active
        }
    }

    /// Whether the tenant's login is enabled on the engine in this state.
    #[must_use]
    pub const fn login_enabled(self) -> bool {
        matches!(self, Self::Active)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::UserDisabled => "user_disabled",
            Self::AdminDisabled => "admin_disabled",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an operation was refused for the tenant's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    AlreadyDisabled,
    NotDisabled,
    AdminLocked,
    NotAdminDisabled,
    Deleted,
    UnknownFlavor,
    OperatorOnly,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::AlreadyDisabled => "database is already disabled",
            Self::NotDisabled => "database is not disabled",
            Self::AdminLocked => "database is locked by an administrator",
            Self::NotAdminDisabled => "database is not disabled by an administrator",
            Self::Deleted => "database has been deleted",
            Self::UnknownFlavor => "database flavor is not mysql or postgres",
            Self::OperatorOnly => "operation requires an operator",
        };
        f.write_str(msg)
    }
}

/// Per-tenant notified-episode marker for storage notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageNotice {
    #[default]
    None,
    Warning,
    Breach,
}

impl StorageNotice {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warning => "warning",
            Self::Breach => "breach",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "warning" => Some(Self::Warning),
            "breach" => Some(Self::Breach),
            _ => None,
        }
    }
}

/// Who is driving a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// The tenant's owner acting through self-service.
    Owner { id: String },
    /// A platform operator.
    Operator { id: String },
    /// Background jobs such as the capacity sweep.
    System,
}

impl Actor {
    #[must_use]
    pub fn is_operator(&self) -> bool {
        matches!(self, Self::Operator { .. } | Self::System)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Owner { id } | Self::Operator { id } => id,
            Self::System => "system",
        }
    }
}
