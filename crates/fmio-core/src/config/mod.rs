//! Configuration management for fmio.
//!
//! User preferences ([`settings::Config`]) are stored as a TOML file and
//! read once at startup; jobs read the flags they need when they start.

pub mod settings;
