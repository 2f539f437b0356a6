//! Batch scheduling for basinio.
//!
//! Every batch runs on the calling thread plus up to `N - 1` scoped worker
//! threads that are spawned and joined inside the call. There is no
//! persistent pool.
//!
//! # Architecture
//!
//! - [`WorkQueue`] -- bounded MPMC queue of work items with `close` (finish
//!   after a final drain) and `abort` (drop remaining work)
//! - [`retrieve_all`] -- the Retrieval Scheduler: the calling thread reads
//!   raw bytes grouped by backing file while workers decode completed units
//! - [`for_each_parallel`] -- run a fallible closure over a slice, used for
//!   payload compression before a blob flush
//!
//! # Design Rules
//!
//! - The first error aborts the batch and is returned; no partial results
//! - Completion order is unspecified; only "all done on return" holds

pub mod parallel;
pub mod queue;
pub mod retrieve;

pub use parallel::for_each_parallel;
pub use queue::WorkQueue;
pub use retrieve::{retrieve_all, RetrieveStats};

/// Queue slots per worker thread during retrieval.
pub const QUEUE_SLOTS_PER_WORKER: usize = 4;
