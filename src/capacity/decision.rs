use crate::types::{StorageNotice, TenantDatabase};

/// What the sweep does for one measured tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityAction {
    /// Quota reached: revoke writes and notify, on every sweep it holds.
    RevokeAndNotify,
    /// Warning ratio crossed for the first time this episode.
    Warn,
    /// Usage fell back below the warning ratio; a later breach notifies again.
    ClearNotice,
    None,
}

impl CapacityAction {
    pub const fn revokes(self) -> bool {
        matches!(self, Self::RevokeAndNotify)
    }

    /// The notice marker the tenant carries after this action is applied.
    pub const fn notice_after(self, current: StorageNotice) -> StorageNotice {
        match self {
            Self::RevokeAndNotify => StorageNotice::Breach,
            Self::Warn => StorageNotice::Warning,
            Self::ClearNotice => StorageNotice::None,
            Self::None => current,
        }
    }
}

pub fn decide(tenant: &TenantDatabase, used_kb: i64, warning_ratio: f64) -> CapacityAction {
    let quota = tenant.allocated_size_kb;
    let notice = tenant.storage_notice;

    if used_kb >= quota {
        return CapacityAction::RevokeAndNotify;
    }

    if used_kb as f64 >= warning_ratio * quota as f64 {
        // A tenant coming down from a breach is still inside the same episode.
        return if notice == StorageNotice::None {
            CapacityAction::Warn
        } else {
            CapacityAction::None
        };
    }

    if notice == StorageNotice::None {
        CapacityAction::None
    } else {
        CapacityAction::ClearNotice
    }
}
