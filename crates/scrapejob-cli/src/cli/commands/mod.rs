//! CLI command handlers, one file per command.

mod add;
mod notifications;
mod recover;
mod remove;
mod set_enabled;
mod status;

pub use add::{run_add, AddArgs};
pub use notifications::run_notifications;
pub use recover::run_recover;
pub use remove::run_remove;
pub use set_enabled::run_set_enabled;
pub use status::run_status;

#[cfg(test)]
pub(crate) use status::relative;
