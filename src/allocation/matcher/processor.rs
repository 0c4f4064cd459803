//! Processor Matcher

use crate::domain::{Processor, RequestedNode, RequestedProcessor};
use crate::error::{Error, Result};

/// Matches the processor slice of a template
pub struct ProcessorMatcher;

impl ProcessorMatcher {
    /// At most one processor spec is supported
    pub fn validate(template: &RequestedNode) -> Result<()> {
        if template.processors.len() > 1 {
            return Err(Error::Allocation(
                "Allocation of more than one processor type is not supported".into(),
            ));
        }
        Ok(())
    }

    pub fn matches(template: &RequestedNode, processors: &[Processor]) -> bool {
        match template.processors.first() {
            Some(spec) => {
                let count = processors
                    .iter()
                    .filter(|p| Self::qualifies(spec, p))
                    .count();
                count >= spec.quantity.map_or(1, |q| q as usize)
            }
            None => !processors.is_empty(),
        }
    }

    fn qualifies(spec: &RequestedProcessor, processor: &Processor) -> bool {
        if spec.model.is_some() && processor.model != spec.model {
            return false;
        }
        if spec.instruction_set.is_some() && processor.instruction_set != spec.instruction_set {
            return false;
        }
        if let Some(extensions) = &spec.instruction_set_extensions {
            let supported = &processor.instruction_set_extensions;
            if !extensions.iter().all(|e| supported.contains(e)) {
                return false;
            }
        }
        if spec.total_cores.is_some_and(|cores| processor.total_cores < cores) {
            return false;
        }
        if spec
            .max_speed_mhz
            .is_some_and(|speed| processor.max_speed_mhz < speed)
        {
            return false;
        }
        true
    }
}
