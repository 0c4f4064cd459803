//! Component Matchers
//!
//! Pure filters checking one slice of a template against the components of
//! a blade. `HostMatcher` combines them into a whole-blade filter.

mod host;
mod local_drive;
mod memory;
mod network_interface;
mod processor;

pub use host::HostMatcher;
pub use local_drive::LocalDriveMatcher;
pub use memory::MemoryMatcher;
pub use network_interface::NetworkInterfaceMatcher;
pub use processor::ProcessorMatcher;

/// Greedy consuming match: for every spec, in order, take the smallest
/// qualifying unit still in the pool and remove it. Returns the consumed
/// units, or `None` once a spec finds nothing.
pub(crate) fn consume_smallest<'a, S, T>(
    specs: &[S],
    mut pool: Vec<&'a T>,
    qualifies: impl Fn(&S, &T) -> bool,
    size: impl Fn(&T) -> u64,
) -> Option<Vec<&'a T>> {
    if pool.len() < specs.len() {
        return None;
    }

    let mut selected = Vec::with_capacity(specs.len());
    for spec in specs {
        let index = pool
            .iter()
            .enumerate()
            .filter(|(_, unit)| qualifies(spec, **unit))
            .min_by_key(|(_, unit)| size(**unit))
            .map(|(index, _)| index)?;
        selected.push(pool.remove(index));
    }
    Some(selected)
}
