//! Host Matcher
//!
//! Reduces a blade pool to the blades that satisfy a whole template. Each
//! component category is checked independently; there is no ranking, the
//! pool order is preserved and the caller takes the first blade.

use super::{LocalDriveMatcher, MemoryMatcher, NetworkInterfaceMatcher, ProcessorMatcher};
use crate::domain::{Blade, Drive, Location, RequestedNode};
use crate::error::{Error, Result};
use tracing::debug;

pub struct HostMatcher;

impl HostMatcher {
    /// Validate the single-spec constraints and return the template's
    /// location, if any
    pub fn validate(template: &RequestedNode) -> Result<Option<Location>> {
        ProcessorMatcher::validate(template)?;
        MemoryMatcher::validate(template)?;

        let mut locations = template.distinct_locations().into_iter();
        let location = locations.next();
        if locations.next().is_some() {
            return Err(Error::Allocation(
                "Allocation of assets on multiple locations is not supported".into(),
            ));
        }
        Ok(location)
    }

    /// Blades satisfying every constraint of the template, in pool order
    pub fn matches<'a>(
        template: &RequestedNode,
        blades: impl IntoIterator<Item = &'a Blade>,
    ) -> Result<Vec<&'a Blade>> {
        let location = Self::validate(template)?;

        let matching: Vec<&Blade> = blades
            .into_iter()
            .filter(|blade| Self::matches_blade(template, location.as_ref(), blade))
            .collect();

        debug!(
            "Template {} matched {} blade(s)",
            template.name,
            matching.len()
        );
        Ok(matching)
    }

    fn matches_blade(template: &RequestedNode, location: Option<&Location>, blade: &Blade) -> bool {
        if let Some(location) = location {
            if blade.location.as_ref() != Some(location) {
                return false;
            }
        }

        let drives: Vec<&Drive> = blade.drives().collect();
        ProcessorMatcher::matches(template, &blade.processors)
            && MemoryMatcher::matches(template, &blade.memory)
            && LocalDriveMatcher::matches(template, &drives)
            && NetworkInterfaceMatcher::matches(template, &blade.network_interfaces)
    }
}
