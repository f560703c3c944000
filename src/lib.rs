//! quadfs library
//!
//! A distributed file store: the client splits each file into four parts
//! and spreads them with 2x redundancy across four storage servers, then
//! reconstructs files by querying whichever servers survive.

pub mod client;
pub mod command;
pub mod config;
pub mod connbuf;
pub mod parts;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod wire;
