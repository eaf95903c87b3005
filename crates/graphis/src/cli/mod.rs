//! Command implementations for the Graphis CLI.

pub mod config;
pub mod embed;
pub mod evaluate;
pub mod matching;
pub mod models;
pub mod train;
