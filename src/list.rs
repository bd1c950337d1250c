//! Filepath: src/list.rs
//!
//! `SkipVec` - a blocked skip-list indexed sparse map.
//!
//! Keys are 64-bit indices partitioned into 32-wide windows; each populated
//! window is one block node carrying the window's values plus the skip
//! chain links. The skip list orders *blocks* by their window start, never
//! individual keys, so lookups pay the skip descent once per 32 indices at
//! worst.
//!
//! # Level balancing
//!
//! Unlike a classical skip list, the list-wide level count is a deterministic
//! function of the block count: a level is added when `width > 2^level` and
//! the top level is dropped (with hysteresis, see [`MIN_LEVEL`]) as blocks
//! disappear. Randomness only decides which levels an individual block
//! participates in. With few blocks the structure degrades gracefully into a
//! doubly-linked run of windows; with many it is a skip list over windows.

use std::cell::Cell;
use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::ptr as StdPtr;
use std::ptr::NonNull;

use crate::block::{BLOCK_OFFSET_MASK, BLOCK_WIDTH, BlockNode, MAX_LEVELS};
use crate::rng::LevelRng;
use crate::tracing_helpers::{debug_log, trace_log};

/// Hysteresis floor for dropping the top level.
///
/// After a block removal the top level is dropped only when
/// `level >= MIN_LEVEL` and `width <= 2^level - 2^MIN_LEVEL`. The `2^MIN_LEVEL`
/// slack keeps an insert/erase sequence oscillating around a power-of-two
/// width from adding and dropping the same level on every call.
pub const MIN_LEVEL: i64 = 6;

thread_local! {
    /// Rightmost predecessor recorded per level by the latest descent.
    ///
    /// Shared by every container on the thread (type-erased since a
    /// `thread_local!` cannot be generic). Each public operation overwrites
    /// it in `find_left` and reads it back before anything else touches it,
    /// so co-resident containers never observe each other's paths.
    static SEARCH_PATH: [Cell<*mut ()>; MAX_LEVELS] =
        const { [const { Cell::new(StdPtr::null_mut()) }; MAX_LEVELS] };
}

/// Record the node last moved off of at `level`.
#[inline]
fn path_store<V>(level: usize, node: *mut BlockNode<V>) {
    SEARCH_PATH.with(|path| path[level].set(node.cast()));
}

/// Read back the predecessor recorded at `level`.
#[inline]
fn path_load<V>(level: usize) -> *mut BlockNode<V> {
    SEARCH_PATH.with(|path| path[level].get()).cast()
}

/// An indexed sparse map over 64-bit keys.
///
/// Behaves like a random-access vector where indices cluster (one block per
/// 32-wide window, values inline) and like a sorted map where they are sparse
/// (one small block per occupied window). Reads of absent keys return a
/// caller-supplied `invalid` sentinel instead of failing.
///
/// `set` and `erase` are independent: storing the `invalid` value does *not*
/// erase the key. `invalid` is purely the result reported for missing reads;
/// callers that store it forfeit the ability to distinguish it from absence
/// through [`get`](Self::get) (though [`has`](Self::has) still can).
///
/// The container is single-threaded (`!Send + !Sync`): links are raw
/// pointers and the search path lives in thread-local storage.
///
/// ```compile_fail
/// use skipvec::SkipVec;
///
/// fn requires_send<T: Send>(_: T) {}
/// requires_send(SkipVec::new(0i64)); // SkipVec is !Send
/// ```
///
/// # Example
///
/// ```rust
/// use skipvec::SkipVec;
///
/// let mut map: SkipVec<f64> = SkipVec::new(f64::NAN);
///
/// map.set(3, 1.5);
/// map.set(1_000_000, 2.5);
///
/// assert_eq!(map.get(3), 1.5);
/// assert_eq!(map.get(1_000_000), 2.5);
/// assert!(map.get(4).is_nan());
///
/// assert!(map.erase(3));
/// assert!(!map.erase(3));
/// ```
pub struct SkipVec<V> {
    /// Permanent value-less block before every real window.
    head: NonNull<BlockNode<V>>,

    /// Permanent value-less block after every real window.
    tail: NonNull<BlockNode<V>>,

    /// Number of non-sentinel blocks.
    width: u64,

    /// Current top level index (0 means a single level exists).
    level: i64,

    /// Sentinel reported for missing reads.
    invalid: V,

    /// Stream for promotion coins and new-block level draws.
    rng: LevelRng,

    /// Marker making `SkipVec` `!Send` and `!Sync`.
    ///
    /// Links are raw pointers and the search-path cache is thread-local
    /// state shared across instances; neither survives crossing threads.
    _not_send_sync: PhantomData<*const ()>,
}

impl<V: Copy> SkipVec<V> {
    /// Create an empty map with the default RNG seed.
    ///
    /// `invalid` is the value reported for every missing read.
    #[must_use]
    pub fn new(invalid: V) -> Self {
        Self::with_seed(invalid, crate::rng::DEFAULT_SEED)
    }

    /// Create an empty map with an explicit RNG seed.
    ///
    /// A zero seed is substituted by [`crate::rng::DEFAULT_SEED`]. Two maps
    /// built with the same seed and fed the same operation sequence have
    /// identical block topology.
    #[must_use]
    pub fn with_seed(invalid: V, seed: u64) -> Self {
        let head: *mut BlockNode<V> = Box::into_raw(BlockNode::new(0, 0));
        let tail: *mut BlockNode<V> = Box::into_raw(BlockNode::new(0, 0));

        // SAFETY: fresh allocations; close the level-0 chain head -> tail.
        unsafe {
            (*head).set_right(0, tail);
            (*tail).set_left(0, head);
        }

        Self {
            // SAFETY: Box::into_raw never returns null.
            head: unsafe { NonNull::new_unchecked(head) },
            tail: unsafe { NonNull::new_unchecked(tail) },
            width: 0,
            level: 0,
            invalid,
            rng: LevelRng::new(seed),
            _not_send_sync: PhantomData,
        }
    }

    /// Current top level index (inspection only).
    #[inline]
    #[must_use]
    pub const fn current_level(&self) -> i64 {
        self.level
    }

    /// Number of populated 32-wide windows (inspection only).
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u64 {
        self.width
    }

    /// Whether the map holds no live values.
    ///
    /// Equivalent to `width() == 0`: a block dies with its last value.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0
    }

    /// Whether a live value exists at `index`.
    #[must_use]
    pub fn has(&self, index: u64) -> bool {
        if self.width == 0 {
            return false;
        }

        let node: NonNull<BlockNode<V>> = self.find_left(index);
        if !self.owns(node, index) {
            return false;
        }

        // SAFETY: block owned by self; borrow scoped to this call.
        let block: &BlockNode<V> = unsafe { node.as_ref() };
        block.has((index - block.base_index()) as usize)
    }

    /// The live value at `index`, or the `invalid` sentinel.
    #[must_use]
    pub fn get(&self, index: u64) -> V {
        if self.width == 0 {
            return self.invalid;
        }

        let node: NonNull<BlockNode<V>> = self.find_left(index);
        if !self.owns(node, index) {
            return self.invalid;
        }

        // SAFETY: block owned by self; borrow scoped to this call.
        let block: &BlockNode<V> = unsafe { node.as_ref() };
        block
            .get((index - block.base_index()) as usize)
            .unwrap_or(self.invalid)
    }

    /// Insert or overwrite the value at `index`.
    ///
    /// Creates the owning block when the 32-wide window is unpopulated.
    /// Storing the `invalid` value is an ordinary write, not an erase; use
    /// [`erase`](Self::erase) to remove a key.
    pub fn set(&mut self, index: u64, value: V) {
        let node: NonNull<BlockNode<V>> = self.find_left(index);

        if self.owns(node, index) {
            // SAFETY: block owned by self; exclusive access via &mut self.
            let block: &mut BlockNode<V> = unsafe { &mut *node.as_ptr() };
            block.set((index - block.base_index()) as usize, value);
            return;
        }

        let base: u64 = index & !BLOCK_OFFSET_MASK;
        let node: NonNull<BlockNode<V>> = self.insert_node(base);

        // SAFETY: freshly inserted block, exclusively ours.
        unsafe { (*node.as_ptr()).set((index - base) as usize, value) };
    }

    /// Remove the value at `index`; returns whether one was present.
    ///
    /// When the owning block's last value goes, the block is unlinked and
    /// freed, and the list may drop its top level (see [`MIN_LEVEL`]).
    pub fn erase(&mut self, index: u64) -> bool {
        if self.width == 0 {
            return false;
        }

        let node: NonNull<BlockNode<V>> = self.find_left(index);
        if !self.owns(node, index) {
            return false;
        }

        // SAFETY: block owned by self; exclusive access via &mut self.
        let block: &mut BlockNode<V> = unsafe { &mut *node.as_ptr() };
        let slot: usize = (index - block.base_index()) as usize;

        if !block.has(slot) {
            return false;
        }

        block.erase_slot(slot);
        if block.is_empty() {
            self.remove_node(node);
        }
        true
    }

    // ========================================================================
    //  Search
    // ========================================================================

    /// Descend from the top level to the rightmost block with
    /// `base_index <= index` (head when none exists).
    ///
    /// Side effect: records, per level, the last node moved off of into the
    /// thread-local search path. `insert_node` and `remove_node` splice
    /// against that path, so they must run under the same public call as the
    /// `find_left` that produced it.
    fn find_left(&self, index: u64) -> NonNull<BlockNode<V>> {
        let tail: *mut BlockNode<V> = self.tail.as_ptr();
        let mut cur: NonNull<BlockNode<V>> = self.head;
        let mut level: i64 = self.level;

        while level >= 0 {
            // SAFETY: `cur` is head or a spliced block; every chain at a
            // level <= self.level is closed into tail, so right links along
            // it are non-null.
            let next: *mut BlockNode<V> = unsafe { cur.as_ref().right(level as u8) };

            if next != tail && unsafe { (*next).base_index() } <= index {
                // SAFETY: `next` is on the chain, hence non-null.
                cur = unsafe { NonNull::new_unchecked(next) };
            } else {
                path_store(level as usize, cur.as_ptr());
                level -= 1;
            }
        }

        cur
    }

    /// Whether `node` (as returned by `find_left`) owns `index`.
    fn owns(&self, node: NonNull<BlockNode<V>>, index: u64) -> bool {
        if node == self.head {
            return false;
        }

        // find_left guarantees base_index <= index, so this cannot wrap.
        // SAFETY: block owned by self.
        index - unsafe { node.as_ref() }.base_index() < BLOCK_WIDTH as u64
    }

    // ========================================================================
    //  Block insertion / removal
    // ========================================================================

    /// Geometric(1/2) level draw for a new block, capped at the current top.
    fn random_level(&mut self) -> u8 {
        let draw: i64 = i64::from(self.rng.next().trailing_zeros() & 31);

        // Never promotes above the existing top; list growth is width-driven
        // and handled by increase_level.
        draw.min(self.level) as u8
    }

    /// Allocate a block for the window at `base_index` and splice it in at
    /// levels `0..=random_level()`, using the search path of the preceding
    /// `find_left`.
    fn insert_node(&mut self, base_index: u64) -> NonNull<BlockNode<V>> {
        let level: u8 = self.random_level();
        let node: *mut BlockNode<V> = Box::into_raw(BlockNode::new(base_index, level));

        for l in 0..=level {
            let left: *mut BlockNode<V> = path_load::<V>(usize::from(l));
            // SAFETY: find_left recorded a live predecessor at every level
            // <= self.level, and `level` is capped there.
            let right: *mut BlockNode<V> = unsafe { (*left).right(l) };

            // SAFETY: splicing between two live neighbors; the new node's
            // link array covers levels 0..=level.
            unsafe {
                (*node).set_left(l, left);
                (*node).set_right(l, right);
                (*left).set_right(l, node);
                (*right).set_left(l, node);
            }
        }

        self.width += 1;
        debug_log!(base_index, level, width = self.width, "block inserted");

        if self.width > (1u64 << self.level) {
            self.increase_level();
        }

        // SAFETY: Box::into_raw never returns null.
        unsafe { NonNull::new_unchecked(node) }
    }

    /// Unlink and free an emptied block, then shrink the list level when the
    /// width has fallen out of the hysteresis band.
    fn remove_node(&mut self, node: NonNull<BlockNode<V>>) {
        let raw: *mut BlockNode<V> = node.as_ptr();
        // SAFETY: live block, owned by self.
        let top: u8 = unsafe { (*raw).level() };

        for l in 0..=top {
            let cached: *mut BlockNode<V> = path_load::<V>(usize::from(l));

            // The search path that found this block ends on the block itself
            // at the levels it participates in; splice from its left link
            // there, and from the recorded predecessor anywhere else.
            let left: *mut BlockNode<V> = if cached == raw {
                // SAFETY: `raw` is spliced in at level `l <= top`.
                unsafe { (*raw).left(l) }
            } else {
                cached
            };
            // SAFETY: as above.
            let right: *mut BlockNode<V> = unsafe { (*raw).right(l) };

            // SAFETY: neighbors of a spliced node are live.
            unsafe {
                (*left).set_right(l, right);
                (*right).set_left(l, left);
            }
        }

        // SAFETY: `raw` came from Box::into_raw in insert_node and is now
        // unlinked from every chain.
        drop(unsafe { Box::from_raw(raw) });
        self.width -= 1;
        debug_log!(width = self.width, "block removed");

        if self.width == 0 {
            // Nothing left to index: collapse to a single level. The
            // hysteresis band below only meters shrinking while blocks
            // remain.
            while self.level > 0 {
                self.decrease_level();
            }
            return;
        }

        if self.level < MIN_LEVEL || self.width > ((1u64 << self.level) - (1u64 << MIN_LEVEL)) {
            return;
        }
        self.decrease_level();
    }

    // ========================================================================
    //  List-level rebalancing
    // ========================================================================

    /// Add a level: grow the sentinels, then promote ~half the blocks of the
    /// old top chain into the new one (at least one when the chain is
    /// non-empty, so the new level starts useful).
    fn increase_level(&mut self) {
        if self.level + 1 >= MAX_LEVELS as i64 {
            // The search path holds 32 levels; past that, width keeps
            // growing on the existing top chain.
            return;
        }

        let head: *mut BlockNode<V> = self.head.as_ptr();
        let tail: *mut BlockNode<V> = self.tail.as_ptr();

        // SAFETY: sentinels live for the container's lifetime.
        unsafe {
            (*head).grow_level();
            (*tail).grow_level();
        }
        self.level += 1;

        let top: u8 = self.level as u8;
        let below: u8 = top - 1;

        let mut left: *mut BlockNode<V> = head;
        // SAFETY: the old top chain is closed into tail.
        let mut node: *mut BlockNode<V> = unsafe { (*head).right(below) };
        let mut promoted: bool = false;

        while node != tail {
            // One coin per candidate. The coin is drawn even when promotion
            // is forced, so the stream consumed here does not depend on
            // chain order.
            let coin: bool = self.rng.next() & 1 == 1;

            if coin || !promoted {
                // SAFETY: `node` is a live block on the old top chain.
                unsafe {
                    (*node).grow_level();
                    (*node).set_left(top, left);
                    (*left).set_right(top, node);
                }
                left = node;
                promoted = true;
            }

            // SAFETY: still walking the closed old top chain.
            node = unsafe { (*node).right(below) };
        }

        // SAFETY: close the new top chain into tail.
        unsafe {
            (*left).set_right(top, tail);
            (*tail).set_left(top, left);
        }

        trace_log!(level = self.level, width = self.width, "level added");
    }

    /// Drop the top level: every node on the top chain (sentinels included)
    /// steps down by one.
    fn decrease_level(&mut self) {
        debug_assert!(self.level > 0, "decrease below level 0");
        let top: u8 = self.level as u8;

        let mut node: *mut BlockNode<V> = self.head.as_ptr();
        while !node.is_null() {
            // SAFETY: walking the closed top chain; tail's right link at any
            // level is null, which terminates the walk past it.
            let right: *mut BlockNode<V> = unsafe { (*node).right(top) };
            // SAFETY: live node on the top chain.
            unsafe { (*node).shrink_level() };
            node = right;
        }

        self.level -= 1;
        trace_log!(level = self.level, width = self.width, "level dropped");
    }

    // ========================================================================
    //  Structure validation
    // ========================================================================

    /// Walk the whole structure and assert its invariants.
    ///
    /// Intended for tests and debugging; O(width · levels).
    ///
    /// # Panics
    ///
    /// Panics on any violated invariant: misaligned or duplicated window
    /// bases, an empty block left in a chain, out-of-order or asymmetric
    /// links, a width/block-count mismatch, or a width above `2^level`.
    pub fn check_invariants(&self) {
        let head: *mut BlockNode<V> = self.head.as_ptr();
        let tail: *mut BlockNode<V> = self.tail.as_ptr();

        // SAFETY (whole function): all pointers reached from the sentinels
        // are blocks owned by self, alive until drop.

        assert!(
            i64::from(unsafe { (*head).level() }) >= self.level
                && i64::from(unsafe { (*tail).level() }) >= self.level,
            "sentinel below list level"
        );

        // Level 0 visits every block: count, alignment, order, occupancy.
        let mut count: u64 = 0;
        let mut node: *mut BlockNode<V> = unsafe { (*head).right(0) };
        let mut prev_base: Option<u64> = None;

        while node != tail {
            let block: &BlockNode<V> = unsafe { &*node };

            assert_eq!(
                block.base_index() & BLOCK_OFFSET_MASK,
                0,
                "window base {} not 32-aligned",
                block.base_index()
            );
            assert_ne!(
                block.bit_map(),
                0,
                "empty block left at base {}",
                block.base_index()
            );
            assert!(
                i64::from(block.level()) <= self.level,
                "block above list level"
            );
            if let Some(prev) = prev_base {
                assert!(prev < block.base_index(), "level-0 chain out of order");
            }

            prev_base = Some(block.base_index());
            count += 1;
            node = unsafe { (*node).right(0) };
        }

        assert_eq!(count, self.width, "width does not match block count");

        // Balance: growth keeps width <= 2^level; on the way down the level
        // lags behind by design of the hysteresis, bounded by the width at
        // which the last drop fired (2^(level+1) - 2^MIN_LEVEL).
        if self.level + 1 < MAX_LEVELS as i64 {
            let growth_bound: u64 = 1u64 << self.level;
            let shrink_lag: u64 = (1u64 << (self.level + 1)).saturating_sub(1u64 << MIN_LEVEL);

            assert!(
                self.width <= growth_bound.max(shrink_lag),
                "width {} out of balance for level {}",
                self.width,
                self.level
            );
        }

        // Every level: closed chain, symmetric links, ascending subset.
        for l in 0..=self.level {
            let lvl: u8 = l as u8;
            let mut cur: *mut BlockNode<V> = head;
            let mut prev_base: Option<u64> = None;

            while cur != tail {
                let right: *mut BlockNode<V> = unsafe { (*cur).right(lvl) };

                assert!(!right.is_null(), "level {lvl} chain not closed");
                assert_eq!(
                    unsafe { (*right).left(lvl) },
                    cur,
                    "asymmetric links at level {lvl}"
                );

                if right != tail {
                    let block: &BlockNode<V> = unsafe { &*right };
                    assert!(
                        block.level() >= lvl,
                        "under-leveled block on level {lvl} chain"
                    );
                    if let Some(prev) = prev_base {
                        assert!(prev < block.base_index(), "level {lvl} chain out of order");
                    }
                    prev_base = Some(block.base_index());
                }

                cur = right;
            }
        }
    }
}

impl<V: Copy> Index<u64> for SkipVec<V> {
    type Output = V;

    /// The live value at `index`, or a reference to the `invalid` sentinel.
    fn index(&self, index: u64) -> &V {
        if self.width != 0 {
            let node: NonNull<BlockNode<V>> = self.find_left(index);

            if self.owns(node, index) {
                // SAFETY: block owned by self; borrow tied to &self.
                let block: &BlockNode<V> = unsafe { &*node.as_ptr() };
                let slot: usize = (index - block.base_index()) as usize;

                if block.has(slot) {
                    return block.slot_ref(slot);
                }
            }
        }

        &self.invalid
    }
}

impl<V: Copy> IndexMut<u64> for SkipVec<V> {
    /// Ensure a slot exists at `index` (initialized to `invalid` when newly
    /// created) and return a mutable reference to it.
    ///
    /// The borrow checker enforces the reference's validity window: it dies
    /// at the next mutating call on the container.
    fn index_mut(&mut self, index: u64) -> &mut V {
        let invalid: V = self.invalid;
        let node: NonNull<BlockNode<V>> = self.find_left(index);

        if self.owns(node, index) {
            // SAFETY: block owned by self; exclusive via &mut self, and the
            // returned borrow keeps self mutably borrowed.
            let block: &mut BlockNode<V> = unsafe { &mut *node.as_ptr() };
            let slot: usize = (index - block.base_index()) as usize;

            if !block.has(slot) {
                block.set(slot, invalid);
            }
            return block.slot_mut(slot);
        }

        let base: u64 = index & !BLOCK_OFFSET_MASK;
        let node: NonNull<BlockNode<V>> = self.insert_node(base);

        // SAFETY: freshly inserted block, exclusively ours.
        let block: &mut BlockNode<V> = unsafe { &mut *node.as_ptr() };
        let slot: usize = (index - base) as usize;
        block.set(slot, invalid);
        block.slot_mut(slot)
    }
}

impl<V: Copy + StdFmt::Debug> StdFmt::Debug for SkipVec<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("SkipVec")
            .field("width", &self.width)
            .field("level", &self.level)
            .field("invalid", &self.invalid)
            .finish_non_exhaustive()
    }
}

impl<V> Drop for SkipVec<V> {
    /// Free every block along the level-0 chain, then the sentinels.
    fn drop(&mut self) {
        let tail: *mut BlockNode<V> = self.tail.as_ptr();

        // SAFETY: the level-0 chain visits every block exactly once; each
        // pointer originated in Box::into_raw and is freed exactly once.
        unsafe {
            let mut node: *mut BlockNode<V> = (*self.head.as_ptr()).right(0);
            while !node.is_null() && node != tail {
                let next: *mut BlockNode<V> = (*node).right(0);
                drop(Box::from_raw(node));
                node = next;
            }

            drop(Box::from_raw(self.head.as_ptr()));
            drop(Box::from_raw(self.tail.as_ptr()));
        }
    }
}
