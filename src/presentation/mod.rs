//! Output shapes for the command line.

pub mod views;
