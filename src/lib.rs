//! proxyctl - Local control center for a CLI AI proxy.
//!
//! Features:
//! - Start, stop and locate the proxy process
//! - Edit the proxy's config.yaml with automatic backup
//! - Custom provider registry and request statistics
//! - OAuth login launching and token status
//! - Self-update of the installed scripts and GUI

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod factory;
pub mod http;
pub mod logger;
pub mod persist;
pub mod process;
pub mod providers;
pub mod proxy_config;
pub mod stats;
pub mod update;
