//! # SkipVec
//!
//! An indexed sparse map built on a blocked skip list.
//!
//! `SkipVec<V>` maps 64-bit indices to values of a trivially-copyable type.
//! Indices are partitioned into fixed 32-wide windows; each populated window
//! is one skip-list node (a *block*) holding the window's values inline with
//! a bitmap tracking occupancy. The skip list orders blocks by window start,
//! never individual keys.
//!
//! ## Design
//!
//! - Clustered indices share a block: dense workloads behave like a vector,
//!   paying one descent per window rather than per key.
//! - Sparse indices get one small block each: memory stays proportional to
//!   the number of populated windows.
//! - The list-wide level count follows the block count deterministically
//!   (`width <= 2^level`), with randomness deciding only which levels a
//!   given block joins. A near-empty list is effectively a doubly-linked
//!   run of windows.
//!
//! Missing reads return a caller-supplied `invalid` sentinel instead of an
//! `Option`, which keeps the hot read path branch-light.
//!
//! ## Example
//!
//! ```rust
//! use skipvec::SkipVec;
//!
//! let mut map: SkipVec<i64> = SkipVec::new(-1);
//!
//! for i in 0..10 {
//!     map.set(i, (i as i64) * 2);
//! }
//! map.set(1_000_000_000, 7);
//!
//! assert_eq!(map.get(4), 8);
//! assert_eq!(map.get(1_000_000_000), 7);
//! assert_eq!(map.get(11), -1); // absent
//!
//! // All of 0..10 share one 32-wide window; the far key has its own.
//! assert_eq!(map.width(), 2);
//! ```
//!
//! ## Threading
//!
//! A `SkipVec` is single-threaded (`!Send + !Sync`). Distinct instances on
//! distinct threads are independent; instances sharing a thread are safe
//! (the shared thread-local search path is overwritten and consumed within
//! each public call).

mod bits;
mod block;
mod tracing_helpers;

pub mod list;
pub mod rng;

pub use block::BLOCK_WIDTH;
pub use list::{MIN_LEVEL, SkipVec};
