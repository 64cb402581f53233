pub mod command;
pub mod config;
pub mod explorer;
pub mod pattern;
pub mod seed;
pub mod shell;
