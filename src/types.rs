use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of one complete scan pass: every requested port mapped to open/closed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ScanResult {
    pub ports: BTreeMap<u16, bool>,
}

impl ScanResult {
    /// A result with every port marked closed.
    pub fn all_closed(ports: &[u16]) -> Self {
        Self {
            ports: ports.iter().map(|&p| (p, false)).collect(),
        }
    }

    /// Open ports in ascending order.
    pub fn open_ports(&self) -> Vec<u16> {
        self.ports
            .iter()
            .filter_map(|(&port, &open)| open.then_some(port))
            .collect()
    }

    pub fn is_open(&self, port: u16) -> bool {
        self.ports.get(&port).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
