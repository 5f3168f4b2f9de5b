//! Atomic mode-setting request builder.
use bitflags::bitflags;
use nix::errno::Errno;
use thiserror::Error;

use crate::bindings;
use crate::kms::{ioctl, Card};

bitflags! {
    /// Flags accepted by the atomic commit ioctl.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct AtomicCommitFlags: u32 {
        const TEST_ONLY = bindings::DRM_MODE_ATOMIC_TEST_ONLY;
        const NONBLOCK = bindings::DRM_MODE_ATOMIC_NONBLOCK;
        const ALLOW_MODESET = bindings::DRM_MODE_ATOMIC_ALLOW_MODESET;
    }
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("empty atomic request")]
    EmptyRequest,
    #[error("atomic commit failed: {0}")]
    IoctlError(Errno),
}

impl From<CommitError> for Errno {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::EmptyRequest => Errno::EINVAL,
            CommitError::IoctlError(e) => e,
        }
    }
}

/// A batch of display-object property changes, applied in one kernel
/// transaction so no intermediate state ever becomes visible.
///
/// Properties are accumulated with [`add_property`](Self::add_property) and
/// submitted with [`commit`](Self::commit), which reshapes them into the
/// four flattened arrays the atomic ioctl expects (object ids, per-object
/// property counts, property ids, values).
#[derive(Debug, Default)]
pub struct AtomicRequest {
    props: Vec<(u32, u32, u64)>,
}

impl AtomicRequest {
    pub fn new() -> Self {
        Default::default()
    }

    /// Schedules `prop_id` on object `obj_id` to be set to `value`.
    pub fn add_property(&mut self, obj_id: u32, prop_id: u32, value: u64) {
        self.props.push((obj_id, prop_id, value));
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Number of scheduled property changes.
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// Builds the ioctl arrays: properties grouped per object, objects in
    /// first-appearance order.
    fn build_arrays(&self) -> (Vec<u32>, Vec<u32>, Vec<u32>, Vec<u64>) {
        let mut objs: Vec<u32> = Vec::new();
        let mut grouped: Vec<Vec<(u32, u64)>> = Vec::new();

        for &(obj_id, prop_id, value) in &self.props {
            match objs.iter().position(|&o| o == obj_id) {
                Some(i) => grouped[i].push((prop_id, value)),
                None => {
                    objs.push(obj_id);
                    grouped.push(vec![(prop_id, value)]);
                }
            }
        }

        let count_props = grouped.iter().map(|g| g.len() as u32).collect();
        let mut props = Vec::with_capacity(self.props.len());
        let mut values = Vec::with_capacity(self.props.len());
        for group in grouped {
            for (prop_id, value) in group {
                props.push(prop_id);
                values.push(value);
            }
        }

        (objs, count_props, props, values)
    }

    /// Submits the whole batch as one atomic commit.
    pub fn commit(&self, card: &Card, flags: AtomicCommitFlags) -> Result<(), CommitError> {
        if self.is_empty() {
            return Err(CommitError::EmptyRequest);
        }

        let (objs, count_props, props, values) = self.build_arrays();

        ioctl::atomic_commit(card, flags.bits(), &objs, &count_props, &props, &values)
            .map_err(CommitError::IoctlError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_group_by_object_in_first_appearance_order() {
        let mut request = AtomicRequest::new();
        request.add_property(31, 1, 100);
        request.add_property(77, 2, 200);
        request.add_property(31, 3, 300);
        request.add_property(77, 4, 400);
        request.add_property(31, 5, 500);

        let (objs, count_props, props, values) = request.build_arrays();

        assert_eq!(objs, vec![31, 77]);
        assert_eq!(count_props, vec![3, 2]);
        assert_eq!(props, vec![1, 3, 5, 2, 4]);
        assert_eq!(values, vec![100, 300, 500, 200, 400]);
    }

    #[test]
    fn empty_request_is_reported() {
        let request = AtomicRequest::new();
        assert!(request.is_empty());
        assert_eq!(request.len(), 0);
    }
}
