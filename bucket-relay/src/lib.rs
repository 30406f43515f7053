pub mod cli;
pub mod gcs;
pub mod load_config;
pub mod telegram;

pub use cli::{run, Cli, Commands};
