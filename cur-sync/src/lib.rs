pub mod aws;
pub mod cli;
pub mod glue;
pub mod load_config;
pub mod s3;
pub mod sns;

pub use cli::{run, Cli, Commands};
