//! Local Drive Matcher

use super::consume_smallest;
use crate::domain::{Drive, RequestedLocalDrive, RequestedNode};

/// Matches every local drive spec of a template against distinct drives
pub struct LocalDriveMatcher;

impl LocalDriveMatcher {
    pub fn matches(template: &RequestedNode, drives: &[&Drive]) -> bool {
        Self::select(&template.local_drives, drives.to_vec()).is_some()
    }

    /// Consume one drive per spec, smallest qualifying capacity first
    pub fn select<'a>(specs: &[RequestedLocalDrive], drives: Vec<&'a Drive>) -> Option<Vec<&'a Drive>> {
        consume_smallest(specs, drives, Self::qualifies, |drive| drive.capacity_gb)
    }

    fn qualifies(spec: &RequestedLocalDrive, drive: &Drive) -> bool {
        if spec.drive_type.is_some() && drive.drive_type != spec.drive_type {
            return false;
        }
        !spec.capacity_gb.is_some_and(|capacity| drive.capacity_gb < capacity)
    }
}
