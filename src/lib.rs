#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod backend;
pub mod cli;
pub mod config;
pub mod dns;
pub mod domain_xml;
pub mod error;
pub mod firewall;
pub mod host;
pub mod logging;
pub mod network_xml;
pub mod paths;
pub mod pool_xml;
pub mod preflight;
pub mod progress;
pub mod qcow2;
pub mod util;
