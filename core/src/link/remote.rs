//! Boundary transport for the world model store
//!
//! A deliberately small newline-delimited JSON protocol over TCP, giving the
//! abstract link traits one concrete implementation so the binary is a
//! complete program. Each request is one JSON object on one line; the store
//! answers with one line, except for range queries, which stream snapshot
//! lines until a done or error marker.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{BrowseError, Result};
use crate::model::{Attribute, Snapshot};

use super::stream::{CursorState, RangeCursor};
use super::{Link, MutationLink, ObservationLink};

/// How long a readiness probe waits for its answer.
const PING_TIMEOUT: Duration = Duration::from_millis(400);

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Ping,
    Search {
        id_regex: &'a str,
    },
    Current {
        id_regex: &'a str,
        attr_regex: &'a str,
    },
    Range {
        id_regex: &'a str,
        from_ms: i64,
        to_ms: i64,
        attr_regex: &'a str,
    },
    Create {
        id: &'a str,
    },
    Update {
        attribute: &'a Attribute,
    },
    Expire {
        id: &'a str,
        ts_ms: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        attribute: Option<&'a str>,
    },
    Delete {
        id: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        attribute: Option<&'a str>,
    },
    RegisterSpec {
        name: &'a str,
        on_demand: bool,
    },
    SetOrigin {
        origin: &'a str,
    },
}

#[derive(Debug, Default, Deserialize)]
struct Response {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ids: Option<Vec<String>>,
    #[serde(default)]
    snapshot: Option<Snapshot>,
}

/// One line of a streaming range response.
#[derive(Debug, Default, Deserialize)]
struct RangeEvent {
    #[serde(default)]
    snapshot: Option<Snapshot>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

struct Wire {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// A TCP connection to one side of the store. The same type backs both the
/// Observation Link (client port) and the Mutation Link (solver port).
pub struct RemoteLink {
    role: &'static str,
    host: String,
    port: u16,
    wire: Option<Wire>,
}

impl RemoteLink {
    /// A link for the read-oriented client port.
    pub fn observation(host: &str, port: u16) -> Self {
        Self::new("client", host, port)
    }

    /// A link for the write-oriented solver port.
    pub fn mutation(host: &str, port: u16) -> Self {
        Self::new("solver", host, port)
    }

    fn new(role: &'static str, host: &str, port: u16) -> Self {
        RemoteLink {
            role,
            host: host.to_string(),
            port,
            wire: None,
        }
    }

    fn wire(&mut self) -> Result<&mut Wire> {
        self.wire
            .as_mut()
            .ok_or_else(|| BrowseError::ConnectionFailed("link is not connected".to_string()))
    }

    async fn send(&mut self, request: &Request<'_>) -> Result<()> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| BrowseError::Fatal(format!("request serialization failed: {e}")))?;
        line.push('\n');
        let wire = self.wire()?;
        wire.writer.write_all(line.as_bytes()).await?;
        wire.writer.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Response> {
        let wire = self.wire()?;
        let mut line = String::new();
        let n = wire.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(BrowseError::ConnectionFailed(
                "store closed the connection".to_string(),
            ));
        }
        serde_json::from_str(&line)
            .map_err(|e| BrowseError::Rejected(format!("malformed response: {e}")))
    }

    /// One request, one response; a non-ok answer becomes `Rejected`.
    async fn request(&mut self, request: Request<'_>) -> Result<Response> {
        self.send(&request).await?;
        let response = self.read_response().await?;
        if response.ok {
            Ok(response)
        } else {
            Err(BrowseError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "store reported failure".to_string()),
            ))
        }
    }
}

#[async_trait]
impl Link for RemoteLink {
    async fn connect(&mut self, timeout: Duration) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| BrowseError::ConnectionFailed(format!("{addr}: connect timed out")))?
            .map_err(|e| BrowseError::ConnectionFailed(format!("{addr}: {e}")))?;
        let (read, write) = stream.into_split();
        self.wire = Some(Wire {
            reader: BufReader::new(read),
            writer: write,
        });
        tracing::info!("connected {} link to {addr}", self.role);
        Ok(())
    }

    async fn is_ready(&mut self) -> bool {
        if self.wire.is_none() {
            return false;
        }
        let probe = async {
            self.send(&Request::Ping).await?;
            self.read_response().await
        };
        match tokio::time::timeout(PING_TIMEOUT, probe).await {
            Ok(Ok(response)) => response.ok,
            _ => false,
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut wire) = self.wire.take() {
            wire.writer.shutdown().await.ok();
            tracing::info!("disconnected {} link from {}:{}", self.role, self.host, self.port);
        }
    }

    fn describe(&self) -> String {
        format!("{} ({} port {})", self.host, self.role, self.port)
    }
}

#[async_trait]
impl ObservationLink for RemoteLink {
    async fn search_ids(&mut self, id_regex: &str) -> Result<Vec<String>> {
        let response = self.request(Request::Search { id_regex }).await?;
        Ok(response.ids.unwrap_or_default())
    }

    async fn current_state(&mut self, id_regex: &str, attr_regex: &str) -> Result<Snapshot> {
        let response = self
            .request(Request::Current {
                id_regex,
                attr_regex,
            })
            .await?;
        Ok(response.snapshot.unwrap_or_default())
    }

    async fn range_stream<'a>(
        &'a mut self,
        id_regex: &str,
        from_ms: i64,
        to_ms: i64,
        attr_regex: &str,
    ) -> Result<Box<dyn RangeCursor + 'a>> {
        self.send(&Request::Range {
            id_regex,
            from_ms,
            to_ms,
            attr_regex,
        })
        .await?;
        let wire = self.wire()?;
        Ok(Box::new(RemoteRangeCursor {
            reader: &mut wire.reader,
            done: false,
            fault: None,
        }))
    }
}

#[async_trait]
impl MutationLink for RemoteLink {
    async fn create_identifier(&mut self, id: &str) -> Result<()> {
        self.request(Request::Create { id }).await.map(|_| ())
    }

    async fn update_attribute(&mut self, attr: &Attribute) -> Result<()> {
        self.request(Request::Update { attribute: attr })
            .await
            .map(|_| ())
    }

    async fn expire(&mut self, id: &str, ts_ms: i64, attr_name: Option<&str>) -> Result<()> {
        self.request(Request::Expire {
            id,
            ts_ms,
            attribute: attr_name,
        })
        .await
        .map(|_| ())
    }

    async fn delete(&mut self, id: &str, attr_name: Option<&str>) -> Result<()> {
        self.request(Request::Delete {
            id,
            attribute: attr_name,
        })
        .await
        .map(|_| ())
    }

    async fn register_attribute_spec(&mut self, name: &str, on_demand: bool) -> Result<()> {
        self.request(Request::RegisterSpec { name, on_demand })
            .await
            .map(|_| ())
    }

    async fn set_origin(&mut self, origin: &str) -> Result<()> {
        self.request(Request::SetOrigin { origin })
            .await
            .map(|_| ())
    }
}

/// Cursor over the streamed lines of one range response. Borrows the link's
/// reader for the duration of the drain, so no other request can interleave
/// with an unfinished range.
struct RemoteRangeCursor<'a> {
    reader: &'a mut BufReader<OwnedReadHalf>,
    done: bool,
    fault: Option<String>,
}

#[async_trait]
impl RangeCursor for RemoteRangeCursor<'_> {
    fn state(&self) -> CursorState {
        if self.fault.is_some() {
            CursorState::Failed
        } else if self.done {
            CursorState::Done
        } else if self.reader.buffer().contains(&b'\n') {
            CursorState::Ready
        } else {
            CursorState::Pending
        }
    }

    fn fault(&self) -> Option<String> {
        self.fault.clone()
    }

    async fn pull(&mut self) -> Option<Snapshot> {
        if self.done || self.fault.is_some() {
            return None;
        }
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) => {
                self.fault = Some("store closed the stream mid-range".to_string());
                None
            }
            Ok(_) => match serde_json::from_str::<RangeEvent>(&line) {
                Ok(event) => {
                    if let Some(snapshot) = event.snapshot {
                        Some(snapshot)
                    } else if let Some(error) = event.error {
                        self.fault = Some(error);
                        None
                    } else if event.done {
                        self.done = true;
                        None
                    } else {
                        self.fault = Some("empty range event".to_string());
                        None
                    }
                }
                Err(e) => {
                    self.fault = Some(format!("malformed range event: {e}"));
                    None
                }
            },
            Err(e) => {
                self.fault = Some(e.to_string());
                None
            }
        }
    }
}
