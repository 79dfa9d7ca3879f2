//! CLI argument parsing using clap 4.x derive macros

use clap::Parser;

use wmbrowse_core::config::{DEFAULT_CLIENT_PORT, DEFAULT_SOLVER_PORT};

/// Interactive console for a world model store
///
/// Connects a read-oriented client link and a write-oriented solver link to
/// the given host, then accepts line commands for searching, inspecting, and
/// mutating Identifiers and their Attributes.
#[derive(Parser, Debug)]
#[command(name = "wmbrowse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Hostname or IP address of the world model store
    pub host: String,

    /// Origin string recorded on Attributes written by this session
    pub origin: String,

    /// Alternate solver (mutation) port
    pub solver_port: Option<String>,

    /// Alternate client (observation) port
    pub client_port: Option<String>,
}

/// Parse an optional port argument. Out-of-range or non-numeric values are
/// reported and the default port is used instead; startup continues.
pub fn resolve_port(arg: Option<&str>, default: u16, which: &str) -> u16 {
    let Some(text) = arg else {
        return default;
    };
    match text.parse::<i64>() {
        Ok(p) if (0..=65535).contains(&p) => p as u16,
        Ok(_) => {
            tracing::warn!("{which} port {text} out of range, using default {default}");
            println!("Port number must be in the range [0,65535]; using default {which} port {default}.");
            default
        }
        Err(_) => {
            tracing::warn!("{which} port \"{text}\" is not a number, using default {default}");
            println!("Unable to parse \"{text}\" as a port number; using default {which} port {default}.");
            default
        }
    }
}

impl Cli {
    pub fn solver_port(&self) -> u16 {
        resolve_port(self.solver_port.as_deref(), DEFAULT_SOLVER_PORT, "solver")
    }

    pub fn client_port(&self) -> u16 {
        resolve_port(self.client_port.as_deref(), DEFAULT_CLIENT_PORT, "client")
    }
}
