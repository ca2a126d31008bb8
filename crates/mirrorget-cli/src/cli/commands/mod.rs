//! CLI command handlers, one file per command.

mod dest;
mod fetch;
mod probe;
mod servers;

pub use dest::run_dest;
pub use fetch::{run_fetch, FetchArgs};
pub use probe::run_probe;
pub use servers::run_servers;
