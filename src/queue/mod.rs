//! Request admission subsystem.
//!
//! # Data Flow
//! ```text
//! enqueue(task)
//!     → QueueEntry pushed to the FIFO wait list
//!     → admit(): while active < max_concurrent, pop head, assign a slot and
//!       a start instant spaced min_interval after the previous dispatch
//!     → waiter sleeps until its start instant, then runs task under deadline
//!     → slot dropped → active decremented → admit() runs once more
//! ```
//!
//! # Design Decisions
//! - The task closure stays with the caller; the queue only hands out slots
//! - Slots are RAII guards, so a cancelled caller can never leak capacity
//! - Bookkeeping lock is never held across an await point

pub mod request_queue;

pub use request_queue::{QueueStats, RequestQueue};
