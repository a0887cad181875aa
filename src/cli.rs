//! Subcommands of the `xgate` binary.

pub(crate) mod list;
pub(crate) mod serve;
