//! Keep long-term AWS access keys in the OS keyring and rotate them without
//! ever being left unable to authenticate.

pub mod aws;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod store;
pub mod vault;
