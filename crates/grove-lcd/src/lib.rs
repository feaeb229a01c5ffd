#![deny(rust_2018_idioms)]

pub use crate::actions::run;
pub use crate::args::get_args as args;

pub(crate) mod actions;
pub(crate) mod args;
pub mod client;

/// Where the daemon listens, and where clients connect, unless told otherwise.
pub const DEFAULT_ENDPOINT: &str = "tcp://[::1]:2010";
