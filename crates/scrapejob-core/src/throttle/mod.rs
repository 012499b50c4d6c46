//! Per-host request throttling.
//!
//! Every remote host gets its own [`RequestQueue`] that runs at most one request at a
//! time and waits a randomized delay between dispatches. Queues are created lazily and
//! live in a [`RequestQueues`] registry keyed by host name, with a separate, faster
//! registry for hosts that tolerate a higher request rate.

mod key;
mod queue;
mod registry;

pub use key::queue_key;
pub use queue::{RequestQueue, DEFAULT_MAX_INTERVAL, MIN_MAX_INTERVAL};
pub use registry::RequestQueues;
