use serde::Serialize;

use crate::vehicle::VehicleId;

/// First-come-first-served admission ledger for the junction box.
///
/// Members are kept in arrival order; only the leading `slots` ranks may
/// proceed. All mutation happens in the orchestrator's sequential phase,
/// decisions read it by shared reference.
#[derive(Debug, Clone, Serialize)]
pub struct JunctionArbiter {
    order: Vec<VehicleId>,
    slots: usize,
}

impl JunctionArbiter {
    pub fn new(slots: usize) -> Self {
        Self {
            order: Vec::new(),
            slots,
        }
    }

    /// Appends `id` unless it is already a member. Returns whether it was added.
    pub fn register(&mut self, id: VehicleId) -> bool {
        if self.order.contains(&id) {
            return false;
        }
        self.order.push(id);
        true
    }

    pub fn rank(&self, id: VehicleId) -> Option<usize> {
        self.order.iter().position(|&m| m == id)
    }

    pub fn is_registered(&self, id: VehicleId) -> bool {
        self.rank(id).is_some()
    }

    /// Registered but queued behind the admitted ranks.
    pub fn is_held(&self, id: VehicleId) -> bool {
        self.rank(id).is_some_and(|r| r >= self.slots)
    }

    /// Drops every member for which `keep` is false, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(VehicleId) -> bool) -> usize {
        let before = self.order.len();
        self.order.retain(|&id| keep(id));
        before - self.order.len()
    }

    pub fn members(&self) -> &[VehicleId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn slots(&self) -> usize {
        self.slots
    }
}
