//! `hsync`: drive a content provider against a synthetic server from the
//! command line.

pub mod cli;
pub mod commands;
pub mod logging;
