//! Command handler modules for the `elp` binary.

pub mod pdt;
pub mod replay;
