//! # shelf-server
//!
//! Process wrapper around [`shelf_core::Server`]: TOML configuration,
//! command-line overrides and logging setup. The binary runs until a
//! control client terminates the server or Ctrl-C is pressed.

pub mod config;
