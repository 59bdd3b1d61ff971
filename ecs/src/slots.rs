//! Block-based slot storage for type-erased component data.
//!
//! A [`RawStorage`] owns a list of fixed-capacity blocks. Each block holds
//! [`SLOTS_PER_BLOCK`] raw value slots and a single `u64` occupancy word;
//! bit `i` set means slot `i` of that block holds a constructed value.
//! Blocks are append-only: once allocated, a block's value region never
//! moves or shrinks until the whole storage is dropped, so slot addresses
//! are stable for the lifetime of the value.
//!
//! The occupancy word is the single source of liveness truth. Accessing or
//! removing a slot whose bit is clear is a bounds violation and panics;
//! this is a corrupted-invariant class fault, never a recoverable error.

use std::alloc::{self, Layout};
use std::ops::ControlFlow;
use std::ptr::NonNull;

use fixedbitset::FixedBitSet;

/// Number of value slots per block. One occupancy word covers a block.
pub const SLOTS_PER_BLOCK: u32 = 64;

struct Block {
    /// Bit `i` set = slot `i` holds a constructed value.
    occupancy: u64,
    values: NonNull<u8>,
}

/// Type-erased slot storage for one component type.
///
/// Knows only the entry size and alignment; construction, destruction and
/// (de)serialization of slot contents are the caller's responsibility,
/// dispatched through the owning type's vtable.
pub struct RawStorage {
    entry_size: usize,
    entry_align: usize,
    blocks: Vec<Block>,
    /// Bit per block: set = the block has at least one free slot.
    /// Lets `add` find a block with room without scanning occupancy words.
    unfull: FixedBitSet,
    len: u32,
}

impl RawStorage {
    /// Creates an empty storage for entries of the given size and alignment.
    pub fn new(entry_size: usize, entry_align: usize) -> Self {
        assert!(
            entry_align > 0 && entry_align.is_power_of_two(),
            "component alignment must be a power of two, got {entry_align}"
        );
        Self {
            entry_size,
            entry_align,
            blocks: Vec::new(),
            unfull: FixedBitSet::new(),
            len: 0,
        }
    }

    /// Entry size in bytes this storage was configured with.
    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    /// Entry alignment in bytes this storage was configured with.
    pub fn entry_align(&self) -> usize {
        self.entry_align
    }

    /// Number of live slots.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether no slot is live.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte distance between consecutive slots. Zero-sized entries still
    /// get one byte so slot pointers stay distinct.
    fn stride(&self) -> usize {
        self.entry_size.max(1)
    }

    fn block_layout(&self) -> Layout {
        Layout::from_size_align(
            self.stride() * SLOTS_PER_BLOCK as usize,
            self.entry_align.max(16),
        )
        .expect("component block layout overflow")
    }

    fn alloc_block(&self) -> NonNull<u8> {
        let layout = self.block_layout();
        // SAFETY: layout has non-zero size (stride is at least 1).
        let ptr = unsafe { alloc::alloc(layout) };
        match NonNull::new(ptr) {
            Some(p) => p,
            None => alloc::handle_alloc_error(layout),
        }
    }

    fn slot_ptr(&self, block: usize, local: u32) -> NonNull<u8> {
        // SAFETY: callers pass a local index below SLOTS_PER_BLOCK, so the
        // offset stays inside the block's allocation.
        unsafe { NonNull::new_unchecked(self.blocks[block].values.as_ptr().add(self.stride() * local as usize)) }
    }

    /// Allocates a slot and returns its address and global index.
    ///
    /// Scans for a block with a free slot first; only allocates a new block
    /// when every existing block is full. Within a block the lowest free
    /// bit wins, so removed indices are reused eagerly. The returned memory
    /// is uninitialized; the caller must construct a value in it before
    /// anything else reads the slot.
    pub fn add(&mut self) -> (NonNull<u8>, u32) {
        let free_block = self.unfull.ones().next();
        let block = match free_block {
            Some(block) => block,
            None => {
                let values = self.alloc_block();
                self.blocks.push(Block { occupancy: 0, values });
                let block = self.blocks.len() - 1;
                self.unfull.grow(self.blocks.len());
                self.unfull.insert(block);
                block
            }
        };

        let word = self.blocks[block].occupancy;
        let local = (!word).trailing_zeros();
        debug_assert!(local < SLOTS_PER_BLOCK);
        self.blocks[block].occupancy = word | 1u64 << local;
        if self.blocks[block].occupancy == u64::MAX {
            self.unfull.set(block, false);
        }
        self.len += 1;

        (self.slot_ptr(block, local), block as u32 * SLOTS_PER_BLOCK + local)
    }

    /// Whether the slot at `index` is live.
    pub fn is_live(&self, index: u32) -> bool {
        let (block, local) = (index / SLOTS_PER_BLOCK, index % SLOTS_PER_BLOCK);
        self.blocks
            .get(block as usize)
            .is_some_and(|b| b.occupancy & 1u64 << local != 0)
    }

    /// Returns the address of the live slot at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is out of range or its occupancy bit is clear.
    pub fn get(&self, index: u32) -> NonNull<u8> {
        assert!(
            self.is_live(index),
            "attempt to access non-existent component slot {index}"
        );
        self.slot_ptr((index / SLOTS_PER_BLOCK) as usize, index % SLOTS_PER_BLOCK)
    }

    /// Releases the slot at `index`. The stored value is not dropped here;
    /// run the type's `free` hook first if it has one.
    ///
    /// # Panics
    ///
    /// Panics if the slot is out of range or its occupancy bit is clear.
    pub fn remove_at(&mut self, index: u32) {
        assert!(
            self.is_live(index),
            "attempt to remove non-existent component slot {index}"
        );
        let (block, local) = ((index / SLOTS_PER_BLOCK) as usize, index % SLOTS_PER_BLOCK);
        self.blocks[block].occupancy &= !(1u64 << local);
        self.unfull.insert(block);
        self.len -= 1;
    }

    /// Visits every live slot as `(address, global index)`.
    ///
    /// Fully empty blocks are skipped without touching their memory.
    /// Return [`ControlFlow::Break`] from the closure to stop early.
    pub fn for_each(&self, mut f: impl FnMut(NonNull<u8>, u32) -> ControlFlow<()>) {
        for (block_idx, block) in self.blocks.iter().enumerate() {
            let mut word = block.occupancy;
            while word != 0 {
                let local = word.trailing_zeros();
                word &= word - 1;
                let index = block_idx as u32 * SLOTS_PER_BLOCK + local;
                if f(self.slot_ptr(block_idx, local), index).is_break() {
                    return;
                }
            }
        }
    }

    /// Reallocates every block's value region with a new entry layout while
    /// preserving occupancy words, so every live slot index stays valid.
    ///
    /// The old value memory is released without running any destructor and
    /// the new memory is uninitialized: after a migrate, every live slot
    /// must be reconstructed before use. This is the storage half of the
    /// hot-reload protocol.
    pub fn migrate(&mut self, entry_size: usize, entry_align: usize) {
        assert!(
            entry_align > 0 && entry_align.is_power_of_two(),
            "component alignment must be a power of two, got {entry_align}"
        );
        let old_layout = self.block_layout();
        self.entry_size = entry_size;
        self.entry_align = entry_align;
        for block in &mut self.blocks {
            // SAFETY: `values` was allocated with `old_layout` by this storage.
            unsafe { alloc::dealloc(block.values.as_ptr(), old_layout) };
            block.values = NonNull::dangling();
        }
        for i in 0..self.blocks.len() {
            self.blocks[i].values = self.alloc_block();
        }
    }

    /// Releases every block and clears all occupancy. Stored values are not
    /// dropped; run `free` hooks first where the type has them.
    pub fn clear(&mut self) {
        let layout = self.block_layout();
        for block in self.blocks.drain(..) {
            // SAFETY: every block's `values` was allocated with `layout`.
            unsafe { alloc::dealloc(block.values.as_ptr(), layout) };
        }
        self.unfull.clear();
        self.len = 0;
    }
}

impl Drop for RawStorage {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_u64() -> RawStorage {
        RawStorage::new(std::mem::size_of::<u64>(), std::mem::align_of::<u64>())
    }

    unsafe fn write_u64(ptr: NonNull<u8>, v: u64) {
        unsafe { ptr.as_ptr().cast::<u64>().write(v) };
    }

    unsafe fn read_u64(ptr: NonNull<u8>) -> u64 {
        unsafe { ptr.as_ptr().cast::<u64>().read() }
    }

    #[test]
    fn add_returns_sequential_indices() {
        let mut s = storage_u64();
        let (_, a) = s.add();
        let (_, b) = s.add();
        let (_, c) = s.add();
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn removed_index_is_reused() {
        let mut s = storage_u64();
        let (_, a) = s.add();
        let (_, _b) = s.add();
        s.remove_at(a);
        assert!(!s.is_live(a));
        let (_, c) = s.add();
        // Lowest free bit wins, so the freed slot comes back first.
        assert_eq!(c, a);
        assert!(s.is_live(c));
    }

    #[test]
    fn index_never_reused_while_live() {
        let mut s = storage_u64();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let (_, idx) = s.add();
            assert!(seen.insert(idx), "index {idx} handed out twice while live");
        }
    }

    #[test]
    fn addresses_stable_across_other_operations() {
        let mut s = storage_u64();
        let (ptr, idx) = s.add();
        unsafe { write_u64(ptr, 0xBEEF) };

        // Force several new blocks and a pile of churn on other indices.
        let others: Vec<u32> = (0..300).map(|_| s.add().1).collect();
        for &o in others.iter().step_by(3) {
            s.remove_at(o);
        }
        for _ in 0..50 {
            s.add();
        }

        let again = s.get(idx);
        assert_eq!(again.as_ptr(), ptr.as_ptr());
        assert_eq!(unsafe { read_u64(again) }, 0xBEEF);
    }

    #[test]
    fn spans_multiple_blocks() {
        let mut s = storage_u64();
        let count = SLOTS_PER_BLOCK * 2 + 5;
        for i in 0..count {
            let (ptr, idx) = s.add();
            assert_eq!(idx, i);
            unsafe { write_u64(ptr, u64::from(i)) };
        }
        assert_eq!(s.len(), count);
        assert_eq!(unsafe { read_u64(s.get(SLOTS_PER_BLOCK + 1)) }, u64::from(SLOTS_PER_BLOCK + 1));
    }

    #[test]
    #[should_panic(expected = "attempt to remove non-existent component slot")]
    fn remove_cleared_bit_is_fatal() {
        let mut s = storage_u64();
        let (_, idx) = s.add();
        s.remove_at(idx);
        s.remove_at(idx);
    }

    #[test]
    #[should_panic(expected = "attempt to access non-existent component slot")]
    fn get_cleared_bit_is_fatal() {
        let mut s = storage_u64();
        let (_, idx) = s.add();
        s.remove_at(idx);
        s.get(idx);
    }

    #[test]
    #[should_panic(expected = "attempt to access non-existent component slot")]
    fn get_out_of_range_is_fatal() {
        let s = storage_u64();
        s.get(7);
    }

    #[test]
    fn for_each_visits_live_slots_in_order() {
        let mut s = storage_u64();
        let indices: Vec<u32> = (0..10).map(|_| s.add().1).collect();
        s.remove_at(indices[2]);
        s.remove_at(indices[7]);

        let mut visited = Vec::new();
        s.for_each(|_, idx| {
            visited.push(idx);
            ControlFlow::Continue(())
        });
        assert_eq!(visited, vec![0, 1, 3, 4, 5, 6, 8, 9]);
    }

    #[test]
    fn for_each_early_termination() {
        let mut s = storage_u64();
        for _ in 0..10 {
            s.add();
        }
        let mut visited = 0;
        s.for_each(|_, _| {
            visited += 1;
            if visited == 4 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(visited, 4);
    }

    #[test]
    fn migrate_preserves_indices() {
        let mut s = storage_u64();
        let indices: Vec<u32> = (0..70).map(|_| s.add().1).collect();
        s.remove_at(indices[3]);

        s.migrate(16, 8);
        assert_eq!(s.entry_size(), 16);
        assert_eq!(s.len(), 69);
        assert!(!s.is_live(indices[3]));
        for &i in indices.iter().filter(|&&i| i != indices[3]) {
            assert!(s.is_live(i), "slot {i} lost by migrate");
        }
        // Fresh memory is writable at the new size.
        let ptr = s.get(indices[0]);
        unsafe { ptr.as_ptr().cast::<[u64; 2]>().write([1, 2]) };
    }

    #[test]
    fn zero_sized_entries() {
        let mut s = RawStorage::new(0, 1);
        let (_, a) = s.add();
        let (_, b) = s.add();
        assert_ne!(a, b);
        s.remove_at(a);
        assert!(s.is_live(b));
    }

    #[test]
    fn clear_releases_everything() {
        let mut s = storage_u64();
        for _ in 0..100 {
            s.add();
        }
        s.clear();
        assert!(s.is_empty());
        let (_, idx) = s.add();
        assert_eq!(idx, 0);
    }
}
