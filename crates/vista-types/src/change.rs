//! Positional change records emitted at commit.
//!
//! Observers apply these to an external mirror (a UI table, a replica) to
//! reproduce the new group sequences without re-reading the view. Record
//! order equals the order the engine performed the mutations.

use crate::GroupId;

bitflags::bitflags! {
    /// Which parts of a row an [`ViewChange::UpdateRow`] record covers.
    ///
    /// Serde support comes from the `bitflags` serde feature.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct ChangeFlags: u8 {
        /// The row's object changed.
        const OBJECT = 0x01;
        /// The row's metadata changed.
        const METADATA = 0x02;
    }
}

/// A single positional delta in the view.
///
/// `index` fields are positions in the group's concatenated sequence at
/// the moment the record was emitted, so a mirror replaying records in
/// order always indexes into a consistent array.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ViewChange {
    /// A group became non-empty.
    InsertGroup { group: GroupId },
    /// A group became empty and was removed.
    DeleteGroup { group: GroupId },
    /// A group's content was wholly invalidated (remove-all).
    ResetGroup { group: GroupId },
    /// A row entered `group` at `index`.
    InsertRow {
        key: String,
        group: GroupId,
        index: u64,
    },
    /// The row previously at `index` left `group`.
    DeleteRow {
        key: String,
        group: GroupId,
        index: u64,
    },
    /// The row at `index` changed in place (position preserved).
    UpdateRow {
        key: String,
        group: GroupId,
        index: u64,
        flags: ChangeFlags,
    },
}

impl ViewChange {
    /// The group this record concerns.
    #[must_use]
    pub const fn group(&self) -> &GroupId {
        match self {
            Self::InsertGroup { group }
            | Self::DeleteGroup { group }
            | Self::ResetGroup { group }
            | Self::InsertRow { group, .. }
            | Self::DeleteRow { group, .. }
            | Self::UpdateRow { group, .. } => group,
        }
    }

    /// The key this record concerns, when it is row-level.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::InsertRow { key, .. }
            | Self::DeleteRow { key, .. }
            | Self::UpdateRow { key, .. } => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_accessors() {
        let g = GroupId::new("g");
        let insert = ViewChange::InsertRow {
            key: "k".to_owned(),
            group: g.clone(),
            index: 3,
        };
        assert_eq!(insert.group(), &g);
        assert_eq!(insert.key(), Some("k"));

        let reset = ViewChange::ResetGroup { group: g.clone() };
        assert_eq!(reset.key(), None);
    }

    #[test]
    fn flags_combine() {
        let both = ChangeFlags::OBJECT | ChangeFlags::METADATA;
        assert!(both.contains(ChangeFlags::OBJECT));
        assert!(both.contains(ChangeFlags::METADATA));
        assert!(!ChangeFlags::OBJECT.contains(ChangeFlags::METADATA));
    }
}
