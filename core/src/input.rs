//! Buffered operator input
//!
//! The session loop must check for input without blocking, while workflows
//! like type negotiation and `expire` read follow-up lines synchronously.
//! `LineSource` captures both shapes; the stdin implementation feeds lines
//! through a channel from a dedicated reader thread, and tests use a
//! scripted source.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};

/// Result of a non-blocking input check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPoll {
    /// A full line is available.
    Line(String),
    /// Nothing buffered right now.
    Empty,
    /// The input source has ended (EOF or reader failure).
    Closed,
}

/// A line-oriented input source for the session.
pub trait LineSource: Send {
    /// Check for an available line without blocking.
    fn try_next_line(&mut self) -> InputPoll;

    /// Block the calling command until a line arrives. Returns `None` once
    /// the source is closed.
    fn next_line_blocking(&mut self) -> Option<String>;
}

/// Stdin-backed source. A dedicated thread reads lines and forwards them over
/// a channel, so availability checks never touch stdin directly.
pub struct StdinSource {
    rx: Receiver<String>,
}

impl StdinSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("stdin-reader".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    match line {
                        Ok(l) => {
                            if tx.send(l).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("stdin read failed: {e}");
                            break;
                        }
                    }
                }
                // Dropping the sender closes the source.
            })
            .ok();
        StdinSource { rx }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSource for StdinSource {
    fn try_next_line(&mut self) -> InputPoll {
        match self.rx.try_recv() {
            Ok(line) => InputPoll::Line(line),
            Err(TryRecvError::Empty) => InputPoll::Empty,
            Err(TryRecvError::Disconnected) => InputPoll::Closed,
        }
    }

    fn next_line_blocking(&mut self) -> Option<String> {
        self.rx.recv().ok()
    }
}

/// Pre-scripted source for tests: hands out the given lines in order, then
/// reports closed.
pub struct ScriptedSource {
    lines: std::collections::VecDeque<String>,
    /// Number of lines handed out so far.
    pub consumed: usize,
}

impl ScriptedSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedSource {
            lines: lines.into_iter().map(Into::into).collect(),
            consumed: 0,
        }
    }
}

impl LineSource for ScriptedSource {
    fn try_next_line(&mut self) -> InputPoll {
        match self.lines.pop_front() {
            Some(l) => {
                self.consumed += 1;
                InputPoll::Line(l)
            }
            None => InputPoll::Closed,
        }
    }

    fn next_line_blocking(&mut self) -> Option<String> {
        match self.try_next_line() {
            InputPoll::Line(l) => Some(l),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_source_order_and_close() {
        let mut src = ScriptedSource::new(["one", "two"]);
        assert_eq!(src.try_next_line(), InputPoll::Line("one".to_string()));
        assert_eq!(src.next_line_blocking(), Some("two".to_string()));
        assert_eq!(src.try_next_line(), InputPoll::Closed);
        assert_eq!(src.consumed, 2);
    }
}
