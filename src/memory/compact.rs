use crate::memory::{ReusePolicy, SlotId};

/// Best-fit reuse: the smallest free slot that fits, else the largest free slot grown to fit,
/// else a new slot.
#[derive(Clone, Debug, Default)]
pub struct CompactPolicy {
    free: Vec<SlotId>,
}

impl ReusePolicy for CompactPolicy {
    fn acquire(&mut self, slots: &mut Vec<usize>, bytes: usize) -> SlotId {
        let best_fit = self
            .free
            .iter()
            .enumerate()
            .filter(|(_, s)| slots[**s] >= bytes)
            .min_by_key(|(_, s)| (slots[**s], **s))
            .map(|(i, _)| i);
        if let Some(i) = best_fit {
            return self.free.swap_remove(i);
        }
        let largest = self
            .free
            .iter()
            .enumerate()
            .max_by_key(|(_, s)| (slots[**s], std::cmp::Reverse(**s)))
            .map(|(i, _)| i);
        if let Some(i) = largest {
            let slot = self.free.swap_remove(i);
            log::trace!("growing slot {} from {} to {} bytes", slot, slots[slot], bytes);
            slots[slot] = bytes;
            return slot;
        }
        slots.push(bytes);
        slots.len() - 1
    }

    fn release(&mut self, slot: SlotId) {
        self.free.push(slot);
    }
}
