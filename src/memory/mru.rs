use crate::memory::{ReusePolicy, SlotId};

/// Reuses only the most recently released slot, and only when it is large enough.
#[derive(Clone, Debug, Default)]
pub struct MruPolicy {
    free: Vec<SlotId>,
}

impl ReusePolicy for MruPolicy {
    fn acquire(&mut self, slots: &mut Vec<usize>, bytes: usize) -> SlotId {
        if let Some(top) = self.free.last().copied() {
            if slots[top] >= bytes {
                self.free.pop();
                return top;
            }
        }
        slots.push(bytes);
        slots.len() - 1
    }

    fn release(&mut self, slot: SlotId) {
        self.free.push(slot);
    }
}
