//! Memory Matcher

use crate::domain::{Memory, RequestedMemory, RequestedNode};
use crate::error::{Error, Result};

/// Matches the memory slice of a template
pub struct MemoryMatcher;

impl MemoryMatcher {
    /// At most one memory spec is supported
    pub fn validate(template: &RequestedNode) -> Result<()> {
        if template.memory.len() > 1 {
            return Err(Error::Allocation(
                "Allocation of more than one memory type is not supported".into(),
            ));
        }
        Ok(())
    }

    /// The requested size is an aggregate over every qualifying module
    pub fn matches(template: &RequestedNode, modules: &[Memory]) -> bool {
        let Some(spec) = template.memory.first() else {
            return !modules.is_empty();
        };

        let qualifying: Vec<&Memory> = modules.iter().filter(|m| Self::qualifies(spec, m)).collect();
        if qualifying.is_empty() {
            return false;
        }

        let total_gib: u64 = qualifying.iter().map(|m| m.size_gib).sum();
        spec.size_gib.map_or(true, |size| total_gib >= size)
    }

    fn qualifies(spec: &RequestedMemory, module: &Memory) -> bool {
        if spec.memory_type.is_some() && module.memory_type != spec.memory_type {
            return false;
        }
        !spec.speed_mhz.is_some_and(|speed| module.speed_mhz < speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MemoryType;
    use crate::test_support::memory;

    fn template(spec: RequestedMemory) -> RequestedNode {
        let mut template = RequestedNode::new("node");
        template.memory.push(spec);
        template
    }

    #[test]
    fn test_validate_rejects_two_specs() {
        let mut node = template(RequestedMemory::default());
        node.memory.push(RequestedMemory::default());
        assert!(MemoryMatcher::validate(&node).is_err());
    }

    #[test]
    fn test_no_spec_requires_any_module() {
        let node = RequestedNode::new("node");
        assert!(MemoryMatcher::matches(&node, &[memory(1, 8, 2133)]));
        assert!(!MemoryMatcher::matches(&node, &[]));
    }

    #[test]
    fn test_size_is_aggregated_over_modules() {
        let node = template(RequestedMemory {
            size_gib: Some(16),
            ..Default::default()
        });
        assert!(MemoryMatcher::matches(&node, &[memory(1, 8, 2133), memory(2, 8, 2133)]));
        assert!(!MemoryMatcher::matches(&node, &[memory(1, 8, 2133)]));
    }

    #[test]
    fn test_type_and_speed_filter_before_summing() {
        let node = template(RequestedMemory {
            size_gib: Some(16),
            speed_mhz: Some(2400),
            memory_type: Some(MemoryType::Ddr4),
            ..Default::default()
        });

        let mut slow = memory(1, 8, 2133);
        slow.memory_type = Some(MemoryType::Ddr4);
        let mut fast = memory(2, 8, 2400);
        fast.memory_type = Some(MemoryType::Ddr4);
        let mut other_type = memory(3, 8, 2400);
        other_type.memory_type = Some(MemoryType::Ddr3);

        assert!(!MemoryMatcher::matches(&node, &[slow, fast.clone(), other_type]));

        let mut second_fast = fast.clone();
        second_fast.id = crate::domain::MemoryId(4);
        assert!(MemoryMatcher::matches(&node, &[fast, second_fast]));
    }

    #[test]
    fn test_empty_after_filter_fails() {
        let node = template(RequestedMemory {
            speed_mhz: Some(3200),
            ..Default::default()
        });
        assert!(!MemoryMatcher::matches(&node, &[memory(1, 64, 2133)]));
    }
}
