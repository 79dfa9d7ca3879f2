//! Connections to the world model store
//!
//! The session owns two independent links: the Observation Link reads state
//! (searches, snapshots, historical ranges) and the Mutation Link writes it
//! (creates, updates, expirations, deletions). `LinkPair` manages their
//! shared lifecycle: connect, poll until ready, and idempotent disconnect.

pub mod remote;
pub mod stream;

use std::io::Write as _;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SessionConfig;
use crate::error::{BrowseError, Result};
use crate::model::{Attribute, Snapshot};
use stream::RangeCursor;

/// Lifecycle shared by both link kinds.
#[async_trait]
pub trait Link: Send {
    /// Attempt the low-level connection. Fails immediately on refusal; no
    /// retry.
    async fn connect(&mut self, timeout: Duration) -> Result<()>;

    /// Whether the link has finished its handshake and can serve requests.
    async fn is_ready(&mut self) -> bool;

    /// Tear the connection down. Idempotent; safe on a link that never
    /// became ready.
    async fn disconnect(&mut self);

    /// Human-readable endpoint description for progress output.
    fn describe(&self) -> String;
}

/// Read-oriented connection.
#[async_trait]
pub trait ObservationLink: Link {
    /// Search Identifiers by regular expression (matching happens on the
    /// server).
    async fn search_ids(&mut self, id_regex: &str) -> Result<Vec<String>>;

    /// Fetch the current Snapshot for matching Identifiers. Blocks the
    /// calling command until the store answers.
    async fn current_state(&mut self, id_regex: &str, attr_regex: &str) -> Result<Snapshot>;

    /// Open a streaming cursor over the historical range `[from_ms, to_ms]`.
    async fn range_stream<'a>(
        &'a mut self,
        id_regex: &str,
        from_ms: i64,
        to_ms: i64,
        attr_regex: &str,
    ) -> Result<Box<dyn RangeCursor + 'a>>;
}

/// Write-oriented connection.
#[async_trait]
pub trait MutationLink: Link {
    async fn create_identifier(&mut self, id: &str) -> Result<()>;
    async fn update_attribute(&mut self, attr: &Attribute) -> Result<()>;
    async fn expire(&mut self, id: &str, ts_ms: i64, attr_name: Option<&str>) -> Result<()>;
    async fn delete(&mut self, id: &str, attr_name: Option<&str>) -> Result<()>;

    /// Register an attribute specification ahead of sending values for it.
    async fn register_attribute_spec(&mut self, name: &str, on_demand: bool) -> Result<()>;

    /// Change the attribution string for subsequent writes.
    async fn set_origin(&mut self, origin: &str) -> Result<()>;
}

/// The session's two connections and their shared lifecycle.
pub struct LinkPair {
    pub observation: Box<dyn ObservationLink>,
    pub mutation: Box<dyn MutationLink>,
}

impl LinkPair {
    pub fn new(observation: Box<dyn ObservationLink>, mutation: Box<dyn MutationLink>) -> Self {
        LinkPair {
            observation,
            mutation,
        }
    }

    /// Bring both links up, Observation first. If either fails to connect or
    /// to become ready within the poll budget, whatever did connect is torn
    /// down and the error is returned; the session must not proceed.
    pub async fn connect_all(&mut self, cfg: &SessionConfig) -> Result<()> {
        let observation: &mut dyn Link = self.observation.as_mut();
        if let Err(e) = connect_one(observation, cfg).await {
            self.observation.disconnect().await;
            return Err(e);
        }
        let mutation: &mut dyn Link = self.mutation.as_mut();
        if let Err(e) = connect_one(mutation, cfg).await {
            self.mutation.disconnect().await;
            self.observation.disconnect().await;
            return Err(e);
        }
        Ok(())
    }

    /// Tear both links down. Idempotent.
    pub async fn disconnect_all(&mut self) {
        self.observation.disconnect().await;
        self.mutation.disconnect().await;
    }
}

/// Connect one link and poll its readiness predicate at a fixed interval, up
/// to a bounded attempt count. One progress mark is printed per poll so the
/// operator can see the connection is alive rather than hung.
async fn connect_one(link: &mut dyn Link, cfg: &SessionConfig) -> Result<()> {
    print!("[Connecting to {} .", link.describe());
    std::io::stdout().flush().ok();

    if let Err(e) = link.connect(cfg.connect_timeout).await {
        println!("FAIL]");
        return Err(e);
    }

    let mut polls = 0;
    while !link.is_ready().await {
        polls += 1;
        if polls >= cfg.ready_poll_attempts {
            println!("FAIL]");
            return Err(BrowseError::ConnectionFailed(format!(
                "{} did not become ready after {} polls",
                link.describe(),
                polls
            )));
        }
        tokio::time::sleep(cfg.ready_poll_interval).await;
        print!(".");
        std::io::stdout().flush().ok();
    }
    println!("OK]");
    Ok(())
}
