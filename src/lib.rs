#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod pagination;
pub mod table;

mod render;
mod sources;
mod utils;
