//! CLI subcommands

pub mod bench;
pub mod info;
pub mod recommend;
