//! Library half of the interactive MQTT debug shell: everything the `mqsh`
//! binary wires together lives here so it can also be exercised directly
//! from tests.

pub mod command;
pub mod config;
pub mod filter;
pub mod format;
pub mod handlers;
pub mod history;
pub mod logger;
pub mod message;
pub mod rules;
pub mod shell;
pub mod stats;
pub mod step;
pub mod topic;
pub mod transport;

pub use config::{ShellArgs, ShellConfig, ShellConfigFile};
pub use shell::{Shell, ShellError};
