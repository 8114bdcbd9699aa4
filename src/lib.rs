//! Flowwarden - SDN policy core
//!
//! Decides, for every packet a switch hands to the controller, which
//! synthetic replies to inject and which flow rule to install.
//! Header parsing and frame construction are implemented from scratch.

pub mod config;
pub mod controller;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{BindingKey, Error, Result};
