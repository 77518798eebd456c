//! Plumbing shared by the channel and the console.
pub mod box_error;
pub mod config;
