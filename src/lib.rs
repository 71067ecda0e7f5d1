//! Docker Machine driver for VMware vCloud Director.
//!
//! Provisions one VM per machine by composing a vApp from a catalog
//! template, then drives its power lifecycle and reports state and address.

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod paths;
pub mod store;
pub mod vcd;

pub use driver::{Driver, MachineState, Timings, VmHandle};
pub use error::{Error, Result};
