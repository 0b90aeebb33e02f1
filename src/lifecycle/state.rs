use std::fmt;

use crate::types::{AccessState, Rejection};

/// Every state-changing operation on an existing tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    UserDisable,
    UserEnable,
    AdminDisable,
    AdminEnable,
    RevokeWrite,
    RestoreWrite,
    Reset,
    ResetPassword,
    AllocateStorage,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::UserDisable,
        Operation::UserEnable,
        Operation::AdminDisable,
        Operation::AdminEnable,
        Operation::RevokeWrite,
        Operation::RestoreWrite,
        Operation::Reset,
        Operation::ResetPassword,
        Operation::AllocateStorage,
        Operation::Delete,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserDisable => "disable",
            Self::UserEnable => "enable",
            Self::AdminDisable => "admin_disable",
            Self::AdminEnable => "admin_enable",
            Self::RevokeWrite => "revoke_write",
            Self::RestoreWrite => "restore_write",
            Self::Reset => "reset",
            Self::ResetPassword => "reset_password",
            Self::AllocateStorage => "allocate_storage",
            Self::Delete => "delete",
        }
    }

    pub const fn requires_operator(self) -> bool {
        matches!(
            self,
            Self::AdminDisable
                | Self::AdminEnable
                | Self::RevokeWrite
                | Self::RestoreWrite
                | Self::AllocateStorage
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the state `op` moves a tenant in `state` to, or why it cannot.
pub fn transition(state: AccessState, op: Operation) -> Result<AccessState, Rejection> {
    use AccessState::*;
    use Operation::*;

    match (state, op) {
        (Deleted, _) => Err(Rejection::Deleted),

        (Active, UserDisable) => Ok(UserDisabled),
        (UserDisabled, UserDisable) => Err(Rejection::AlreadyDisabled),
        (AdminDisabled, UserDisable | UserEnable) => Err(Rejection::AdminLocked),

        (UserDisabled, UserEnable) => Ok(Active),
        (Active, UserEnable) => Err(Rejection::NotDisabled),

        (Active | UserDisabled, AdminDisable) => Ok(AdminDisabled),
        (AdminDisabled, AdminDisable) => Err(Rejection::AlreadyDisabled),

        (AdminDisabled, AdminEnable) => Ok(Active),
        (Active | UserDisabled, AdminEnable) => Err(Rejection::NotAdminDisabled),

        (_, RevokeWrite | RestoreWrite | Reset | ResetPassword | AllocateStorage) => Ok(state),

        (_, Delete) => Ok(Deleted),
    }
}
