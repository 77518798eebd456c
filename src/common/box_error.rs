//! Error type shared by every fallible call in the crate.
//!
//! Boxed so that `?` works across serde, tungstenite, io and our own
//! errors, and Send + Sync so a channel can be built on one thread and
//! driven from another.
pub type BoxError = std::boxed::Box<
    dyn std::error::Error // must implement Error to satisfy ?
        + std::marker::Send
        + std::marker::Sync,
>;
