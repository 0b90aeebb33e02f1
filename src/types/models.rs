use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccessState, StorageNotice};

/// Default quota: 1 GiB expressed in KB.
pub const DEFAULT_ALLOCATED_SIZE_KB: i64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantDatabase {
    pub id: String,
    pub flavor: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub allocated_size_kb: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_storage_kb: Option<i64>,
    pub disabled: bool,
    pub admin_disabled: bool,
    pub deleted: bool,
    pub write_revoked: bool,
    pub storage_notice: StorageNotice,
    #[serde(skip)]
    pub provisioned: bool,
}

impl TenantDatabase {
    #[must_use]
    pub fn state(&self) -> AccessState {
        AccessState::from_flags(self.disabled, self.admin_disabled, self.deleted)
    }

    /// Writes the flag representation of `state` back onto the record.
    pub fn set_state(&mut self, state: AccessState) {
        match state {
            AccessState::Active => {
                self.disabled = false;
                self.admin_disabled = false;
            }
            AccessState::UserDisabled => {
                self.disabled = true;
                self.admin_disabled = false;
            }
            AccessState::AdminDisabled => {
                self.disabled = true;
                self.admin_disabled = true;
            }
            AccessState::Deleted => self.deleted = true,
        }
    }
}

/// Filter for tenant listings.
#[derive(Debug, Clone, Default)]
pub struct TenantFilter {
    pub owner_id: Option<String>,
    pub flavor: Option<String>,
    pub include_deleted: bool,
}

#[cfg(test)]
pub(crate) fn sample_tenant(id: &str) -> TenantDatabase {
    TenantDatabase {
        id: id.to_string(),
        flavor: "postgres".to_string(),
        host: "127.0.0.1".to_string(),
        port: 5432,
        name: format!("db{id}"),
        user: format!("user{id}"),
        password: "secret".to_string(),
        owner_id: "owner-1".to_string(),
        owner_email: Some("owner@example.com".to_string()),
        created_at: Utc::now(),
        allocated_size_kb: DEFAULT_ALLOCATED_SIZE_KB,
        default_storage_kb: None,
        disabled: false,
        admin_disabled: false,
        deleted: false,
        write_revoked: false,
        storage_notice: StorageNotice::None,
        provisioned: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_state_round_trips_through_flags() {
        let mut tenant = sample_tenant("1");
        for state in [
            AccessState::UserDisabled,
            AccessState::AdminDisabled,
            AccessState::Active,
            AccessState::Deleted,
        ] {
            tenant.set_state(state);
            assert_eq!(tenant.state(), state);
        }
    }

    #[test]
    fn test_admin_enable_clears_user_flag() {
        let mut tenant = sample_tenant("1");
        tenant.set_state(AccessState::AdminDisabled);
        assert!(tenant.disabled);
        tenant.set_state(AccessState::Active);
        assert!(!tenant.disabled);
        assert!(!tenant.admin_disabled);
    }

    #[test]
    fn test_password_not_serialized() {
        let tenant = sample_tenant("1");
        let json = serde_json::to_value(&tenant).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["storage_notice"], "none");
        assert_eq!(json["name"], "db1");
    }
}
