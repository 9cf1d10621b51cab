//! Pure application of status changes to a status list.
use log::warn;

use crate::entry::StatusChange;
use crate::error::{Error, Result};
use crate::list::StatusList;

pub struct StatusMutator;

impl StatusMutator {
    /// Apply `changes` in order and return the updated list.
    ///
    /// Later changes to the same index win. Only the addressed bits change;
    /// capacity, allocation counter and generation are carried over as is.
    /// The whole batch is validated before any bit is touched, so on error
    /// the input list is the only state there is.
    pub fn apply(list: &StatusList, changes: &[StatusChange]) -> Result<StatusList> {
        for change in changes {
            if change.status_list_index >= list.capacity() {
                return Err(Error::IndexOutOfRange {
                    index: change.status_list_index,
                    capacity: list.capacity(),
                });
            }
            if !list.list_type().supports(change.status_purpose) {
                return Err(Error::UnsupportedPurpose(
                    list.list_type(),
                    change.status_purpose,
                ));
            }
            if change.status_list_index >= list.next_free_index() {
                warn!(
                    "Status change on {} targets unallocated index {}",
                    list.id(),
                    change.status_list_index
                );
            }
        }

        let mut updated = list.clone();
        for change in changes {
            let plane = updated.plane_mut(change.status_purpose)?;
            if !plane.set(change.status_list_index, change.new_value) {
                return Err(Error::IndexOutOfRange {
                    index: change.status_list_index,
                    capacity: list.capacity(),
                });
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::{StatusListId, StatusListType, StatusPurpose};
    use crate::tenant::Tenant;

    fn list(list_type: StatusListType, capacity: usize, allocated: usize) -> StatusList {
        let id = StatusListId::new(Tenant::new("acme").unwrap(), list_type, 3);
        let mut list = StatusList::new(id, capacity).unwrap();
        for _ in 0..allocated {
            list.reserve();
        }
        list
    }

    #[test]
    fn change_is_isolated() {
        let before = list(StatusListType::StatusList2021, 64, 10);
        let after = StatusMutator::apply(
            &before,
            &[StatusChange::new(4, StatusPurpose::Revocation, true)],
        )
        .unwrap();

        assert_eq!(after.id(), before.id());
        assert_eq!(after.capacity(), before.capacity());
        assert_eq!(after.next_free_index(), before.next_free_index());
        assert_eq!(after.generation(), before.generation());
        for i in 0..64 {
            assert_eq!(after.get(StatusPurpose::Revocation, i).unwrap(), i == 4);
            assert!(!after.get(StatusPurpose::Suspension, i).unwrap());
        }
        // The input is left untouched.
        assert!(!before.get(StatusPurpose::Revocation, 4).unwrap());
    }

    #[test]
    fn last_write_wins() {
        let before = list(StatusListType::StatusList2021, 8, 8);
        let after = StatusMutator::apply(
            &before,
            &[
                StatusChange::new(2, StatusPurpose::Suspension, true),
                StatusChange::new(3, StatusPurpose::Suspension, true),
                StatusChange::new(2, StatusPurpose::Suspension, false),
            ],
        )
        .unwrap();
        assert!(!after.get(StatusPurpose::Suspension, 2).unwrap());
        assert!(after.get(StatusPurpose::Suspension, 3).unwrap());
    }

    #[test]
    fn setting_twice_is_idempotent() {
        let before = list(StatusListType::StatusList2021, 64, 2);
        let change = [StatusChange::new(1, StatusPurpose::Revocation, true)];
        let once = StatusMutator::apply(&before, &change).unwrap();
        let twice = StatusMutator::apply(&once, &change).unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            once.plane(StatusPurpose::Revocation).unwrap().encode().unwrap(),
            twice.plane(StatusPurpose::Revocation).unwrap().encode().unwrap()
        );
    }

    #[test]
    fn out_of_range_rejects_whole_batch() {
        let before = list(StatusListType::StatusList2021, 8, 8);
        let err = StatusMutator::apply(
            &before,
            &[
                StatusChange::new(0, StatusPurpose::Revocation, true),
                StatusChange::new(8, StatusPurpose::Revocation, true),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { index: 8, capacity: 8 }));
    }

    #[test]
    fn suspension_unsupported_by_revocation_list() {
        let before = list(StatusListType::RevocationList2020, 8, 1);
        let err = StatusMutator::apply(
            &before,
            &[StatusChange::new(0, StatusPurpose::Suspension, true)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedPurpose(..)));
    }
}
