//! # shelf-client — command-line client
//!
//! Connects to a shelf server, performs the handshake, runs exactly one
//! command and prints the outcome. Hide, reveal and terminate go to the
//! control endpoint; everything else to the normal one.

pub mod config;
pub mod runner;
