use serde::Serialize;
use std::collections::BTreeSet;

/// Ports that changed openness between two observations of one host.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Open now, not open before. Ascending.
    pub opened: Vec<u16>,
    /// Open before, not open now. Ascending.
    pub closed: Vec<u16>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty()
    }
}

/// Compute `current - previous` and `previous - current`.
pub fn detect_changes(current: &[u16], previous: &[u16]) -> ChangeSet {
    let current: BTreeSet<u16> = current.iter().copied().collect();
    let previous: BTreeSet<u16> = previous.iter().copied().collect();
    ChangeSet {
        opened: current.difference(&previous).copied().collect(),
        closed: previous.difference(&current).copied().collect(),
    }
}
