//! Session configuration
//!
//! Plain struct built from the startup arguments; defaults cover the link
//! ports and the timing knobs of the connection poll and the command loop.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default port for the solver (mutation) side of the store.
pub const DEFAULT_SOLVER_PORT: u16 = 7009;
/// Default port for the client (observation) side of the store.
pub const DEFAULT_CLIENT_PORT: u16 = 7010;

/// Everything the session needs to start: where the store lives, who we are
/// when writing, and the timing budget for connecting and polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hostname or IP address of the world model store.
    pub host: String,
    /// Attribution string for Attributes written by this session.
    pub origin: String,
    /// Port for the Mutation Link.
    pub solver_port: u16,
    /// Port for the Observation Link.
    pub client_port: u16,
    /// Low-level connect timeout per link.
    pub connect_timeout: Duration,
    /// Interval between readiness polls after a successful connect.
    pub ready_poll_interval: Duration,
    /// Maximum readiness polls before the link is treated as failed.
    pub ready_poll_attempts: u32,
    /// Sleep between input-availability checks in the command loop.
    pub loop_yield: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            host: "localhost".to_string(),
            origin: "wmbrowse".to_string(),
            solver_port: DEFAULT_SOLVER_PORT,
            client_port: DEFAULT_CLIENT_PORT,
            connect_timeout: Duration::from_secs(10),
            ready_poll_interval: Duration::from_millis(500),
            ready_poll_attempts: 20,
            loop_yield: Duration::from_millis(10),
        }
    }
}

impl SessionConfig {
    /// Build a config from startup arguments. `None` ports use the defaults.
    pub fn new(
        host: impl Into<String>,
        origin: impl Into<String>,
        solver_port: Option<u16>,
        client_port: Option<u16>,
    ) -> Self {
        SessionConfig {
            host: host.into(),
            origin: origin.into(),
            solver_port: solver_port.unwrap_or(DEFAULT_SOLVER_PORT),
            client_port: client_port.unwrap_or(DEFAULT_CLIENT_PORT),
            ..Default::default()
        }
    }
}
