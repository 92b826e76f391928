use std::cell::UnsafeCell;
use std::sync::Arc;

use crate::handle::{make_slot_id, slot_index, SlotId, INVALID_SLOT};
use crate::item::{Callback, FetchState, Item};

/// Shared, index-addressed storage for request items.
///
/// Slot 0 is reserved so that the zero slot id can anchor "invalid". The
/// table is shared between the engine thread and the channel workers; there
/// is no per-item lock. Exclusive access is the queue protocol's job:
///
/// - an item's `state`, `buffer`, `path`, and `io` sub-record belong to
///   whichever side the slot id currently sits on, with the worker's
///   inbox/outbox mutexes providing the ordering edges at every hand-off;
/// - `user`, `callback`, and `lane` are only ever touched from the engine
///   thread (the worker never reads them), so the public control surface may
///   write them regardless of where the slot id is;
/// - a slot is never freed while its id is visible to a worker, so a
///   worker-side lookup cannot observe a reused slot.
pub(crate) struct ItemTable<R> {
    slots: Box<[UnsafeCell<Item<R>>]>,
}

// Safety: see the access discipline above. The table is only shared with
// worker threads spawned by this crate, which restrict themselves to
// generation-checked lookups and the io-side fields of items handed to them
// through their inbox.
unsafe impl<R: Send> Send for ItemTable<R> {}
unsafe impl<R: Send> Sync for ItemTable<R> {}

impl<R> ItemTable<R> {
    fn new(num_slots: usize) -> ItemTable<R> {
        let mut slots = Vec::with_capacity(num_slots);
        for _ in 0..num_slots {
            slots.push(UnsafeCell::new(Item::unused()));
        }
        ItemTable {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Access the item at a pool index without an id check.
    ///
    /// # Safety
    ///
    /// The caller must hold the slot per the access discipline above and
    /// must not create a second live reference to the same item.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn item_at(&self, index: u32) -> &mut Item<R> {
        debug_assert!(index > 0 && (index as usize) < self.slots.len());
        &mut *self.slots[index as usize].get()
    }

    /// Resolve a slot id to its item, or `None` when the id is stale (the
    /// slot was freed, and possibly reused under a newer generation).
    ///
    /// # Safety
    ///
    /// Same contract as [`item_at`](Self::item_at).
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn lookup(&self, slot_id: SlotId) -> Option<&mut Item<R>> {
        if slot_id == INVALID_SLOT {
            return None;
        }
        let item = self.item_at(slot_index(slot_id));
        if item.slot == slot_id {
            Some(item)
        } else {
            None
        }
    }
}

/// Fixed-size request pool: a free-index stack over an [`ItemTable`] plus a
/// generation counter per slot. Alloc, free, and lookup all happen on the
/// engine thread.
pub(crate) struct RequestPool<R> {
    table: Arc<ItemTable<R>>,
    free_slots: Vec<u32>,
    generations: Vec<u32>,
}

impl<R> RequestPool<R> {
    pub(crate) fn new(max_requests: u32) -> RequestPool<R> {
        let size = max_requests as usize + 1;
        // Seed the free stack so that index 1 is popped first.
        let free_slots: Vec<u32> = (1..size as u32).rev().collect();
        RequestPool {
            table: Arc::new(ItemTable::new(size)),
            free_slots,
            generations: vec![0; size],
        }
    }

    pub(crate) fn table(&self) -> Arc<ItemTable<R>> {
        Arc::clone(&self.table)
    }

    /// Allocate a slot and initialize it from the request fields. Returns
    /// the invalid id when the pool is exhausted.
    pub(crate) fn alloc(
        &mut self,
        channel: u32,
        path: &str,
        callback: Callback,
        buffer: Option<Vec<u8>>,
        user_data: &[u8],
    ) -> SlotId {
        let Some(index) = self.free_slots.pop() else {
            return INVALID_SLOT;
        };
        self.generations[index as usize] = self.generations[index as usize].wrapping_add(1);
        let slot_id = make_slot_id(index, self.generations[index as usize]);
        // Safety: the index came off the free stack, so no queue holds it.
        let item = unsafe { self.table.item_at(index) };
        item.init(channel, path, callback, buffer, user_data);
        item.slot = slot_id;
        item.state = FetchState::Allocated;
        slot_id
    }

    /// Free a slot. The id must be live; double-free is a contract
    /// violation.
    pub(crate) fn free(&mut self, slot_id: SlotId) {
        let index = slot_index(slot_id);
        // Safety: only the engine thread frees, and only after the final
        // drain pulled the id out of every queue.
        let item = unsafe { self.table.item_at(index) };
        debug_assert_eq!(item.slot, slot_id);
        debug_assert!(!self.free_slots.contains(&index));
        item.reset();
        self.free_slots.push(index);
    }

    /// Generation-checked lookup from the engine thread.
    #[allow(clippy::mut_from_ref)]
    pub(crate) fn lookup(&self, slot_id: SlotId) -> Option<&mut Item<R>> {
        // Safety: engine-thread access under the field discipline documented
        // on ItemTable.
        unsafe { self.table.lookup(slot_id) }
    }

    #[cfg(test)]
    fn free_count(&self) -> usize {
        self.free_slots.len()
    }
}
