//! Network Interface Matcher

use super::consume_smallest;
use crate::domain::{NetworkInterface, RequestedNetworkInterface, RequestedNode};

/// Matches every network interface spec against distinct interfaces
pub struct NetworkInterfaceMatcher;

impl NetworkInterfaceMatcher {
    pub fn matches(template: &RequestedNode, interfaces: &[NetworkInterface]) -> bool {
        Self::select(&template.network_interfaces, interfaces.iter().collect()).is_some()
    }

    /// Consume one interface per spec, slowest qualifying first
    pub fn select<'a>(
        specs: &[RequestedNetworkInterface],
        interfaces: Vec<&'a NetworkInterface>,
    ) -> Option<Vec<&'a NetworkInterface>> {
        consume_smallest(specs, interfaces, Self::qualifies, |nic| u64::from(nic.speed_mbps))
    }

    fn qualifies(spec: &RequestedNetworkInterface, nic: &NetworkInterface) -> bool {
        !spec.speed_mbps.is_some_and(|speed| nic.speed_mbps < speed)
    }
}
