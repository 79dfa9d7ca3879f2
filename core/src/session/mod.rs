//! Session controller
//!
//! Owns the Link Pair, the type registry, and the operator input source, and
//! drives the top-level state machine: connect both links, loop over input
//! without blocking, dispatch one command at a time, and shut down in order.
//! Exactly one command executes at a time; the input-availability check is
//! the only suspension point in the loop and is polled, never awaited
//! indefinitely, so the loop stays responsive to the stop flag.

pub mod commands;

use std::io::Write as _;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::input::{InputPoll, LineSource};
use crate::link::{LinkPair, MutationLink, ObservationLink};
use crate::output::OutputFormatter;
use crate::registry::TypeRegistry;
use crate::tokenize;

use commands::Command;

/// Operator prompt suffix.
const PROMPT: &str = ">";

/// Lifecycle of one session. The stop flag only moves forward: once
/// `Stopping` is reached the session never runs another command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Running,
    Stopping,
    Terminated,
}

/// Process-wide state for one interactive session.
pub struct Session {
    config: SessionConfig,
    links: LinkPair,
    registry: TypeRegistry,
    input: Box<dyn LineSource>,
    out: OutputFormatter,
    state: SessionState,
    prompt: String,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        observation: Box<dyn ObservationLink>,
        mutation: Box<dyn MutationLink>,
        input: Box<dyn LineSource>,
    ) -> Self {
        let prompt = format!("{}{}", config.host, PROMPT);
        Session {
            config,
            links: LinkPair::new(observation, mutation),
            registry: TypeRegistry::new(),
            input,
            out: OutputFormatter::new(),
            state: SessionState::Connecting,
            prompt,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bring both links up and stamp the session origin on the Mutation
    /// Link. Any failure here aborts the session before the command loop.
    async fn startup(&mut self) -> Result<()> {
        self.links.connect_all(&self.config).await?;
        self.links.mutation.set_origin(&self.config.origin).await?;
        Ok(())
    }

    /// Run the session to completion: connect, loop, disconnect.
    pub async fn run(&mut self) -> Result<()> {
        self.state = SessionState::Connecting;
        if let Err(e) = self.startup().await {
            self.links.disconnect_all().await;
            self.state = SessionState::Terminated;
            println!("--Disconnected--");
            return Err(e);
        }

        self.state = SessionState::Running;
        println!();
        self.print_prompt();

        let mut fatal = None;
        while self.state == SessionState::Running {
            match self.input.try_next_line() {
                InputPoll::Empty => tokio::time::sleep(self.config.loop_yield).await,
                InputPoll::Closed => self.shutdown(),
                InputPoll::Line(line) => {
                    if let Err(e) = self.handle_line(&line).await {
                        if e.is_fatal() {
                            tracing::error!("unrecoverable fault: {e}");
                            self.out.print_error(&format!("Unrecoverable error: {e}"));
                            fatal = Some(e);
                            self.shutdown();
                        } else {
                            tracing::warn!("command failed: {e}");
                            self.out.print_error(&e.to_string());
                        }
                    }
                    if self.state == SessionState::Running {
                        println!();
                        self.print_prompt();
                    }
                }
            }
        }

        self.links.disconnect_all().await;
        self.state = SessionState::Terminated;
        println!("--Disconnected--");
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Tokenize and dispatch one input line. Usage errors and workflow
    /// aborts come back as non-fatal errors; the caller reports them.
    pub async fn handle_line(&mut self, line: &str) -> Result<()> {
        let tokens = tokenize::extract_components(line);
        if tokens.is_empty() {
            return Ok(());
        }
        let command = Command::parse(&tokens)?;
        self.dispatch(command).await
    }

    async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Help => {
                println!("{}", commands::HELP_MSG);
                Ok(())
            }
            Command::Quit => {
                self.shutdown();
                Ok(())
            }
            Command::Search(regexes) => self.cmd_search(regexes).await,
            Command::Status(regexes) => self.cmd_status(regexes).await,
            Command::History(regexes) => self.cmd_history(regexes).await,
            Command::Touch(ids) => self.cmd_touch(ids).await,
            Command::Update { id, attr } => self.cmd_update(id, attr).await,
            Command::Expire { id, attr } => self.cmd_expire(id, attr).await,
            Command::Remove { id, attr } => self.cmd_remove(id, attr).await,
            Command::Copy {
                recursive,
                src,
                dst,
            } => self.cmd_copy(recursive, src, dst).await,
        }
    }

    /// Request shutdown. The flag only moves forward; a stopping session
    /// never resumes.
    fn shutdown(&mut self) {
        if self.state == SessionState::Running || self.state == SessionState::Connecting {
            self.state = SessionState::Stopping;
        }
    }

    fn print_prompt(&self) {
        print!("{}", self.prompt);
        std::io::stdout().flush().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrowseError;
    use crate::input::ScriptedSource;
    use crate::link::testing::{MockMutationLink, MockObservationLink, MutationCall};
    use crate::model::{Attribute, Snapshot};
    use std::sync::{Arc, Mutex};

    fn attr(id: &str, name: &str, origin: &str) -> Attribute {
        Attribute {
            identifier: id.to_string(),
            name: name.to_string(),
            created_ms: 1_000,
            payload: b"v".to_vec(),
            origin: origin.to_string(),
        }
    }

    fn session_with(
        obs: MockObservationLink,
        mutation: MockMutationLink,
        input: Vec<&str>,
    ) -> Session {
        Session::new(
            SessionConfig::new("testhost", "me", None, None),
            Box::new(obs),
            Box::new(mutation),
            Box::new(ScriptedSource::new(input)),
        )
    }

    fn updates(calls: &Arc<Mutex<Vec<MutationCall>>>) -> Vec<Attribute> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MutationCall::Update(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_unknown_command_is_usage_error() {
        let (mutation, calls) = MockMutationLink::new();
        let mut s = session_with(MockObservationLink::default(), mutation, vec![]);
        let err = s.handle_line("frobnicate now").await.unwrap_err();
        assert!(matches!(err, BrowseError::Usage(_)));
        assert!(err.to_string().contains("Command not found"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_line_is_a_no_op() {
        let (mutation, _calls) = MockMutationLink::new();
        let mut s = session_with(MockObservationLink::default(), mutation, vec![]);
        s.handle_line("   ").await.unwrap();
    }

    #[tokio::test]
    async fn test_quit_sets_stop_flag_forward_only() {
        let (mutation, _calls) = MockMutationLink::new();
        let mut s = session_with(MockObservationLink::default(), mutation, vec![]);
        s.state = SessionState::Running;
        s.handle_line("QUIT").await.unwrap();
        assert_eq!(s.state(), SessionState::Stopping);
        // Already stopping; nothing moves it back.
        s.handle_line("help").await.unwrap();
        assert_eq!(s.state(), SessionState::Stopping);
    }

    #[tokio::test]
    async fn test_run_quits_and_terminates_cleanly() {
        let obs = MockObservationLink::default();
        let obs_disconnects = obs.disconnects.clone();
        let (mutation, calls) = MockMutationLink::new();
        let mut s = session_with(obs, mutation, vec!["help", "exit"]);
        s.run().await.unwrap();
        assert_eq!(s.state(), SessionState::Terminated);
        assert_eq!(*obs_disconnects.lock().unwrap(), 1);
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], MutationCall::SetOrigin("me".to_string()));
        assert_eq!(*calls.last().unwrap(), MutationCall::Disconnect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_never_enters_running_when_link_never_ready() {
        let mut obs = MockObservationLink::default();
        obs.never_ready = true;
        let obs_disconnects = obs.disconnects.clone();
        let (mutation, calls) = MockMutationLink::new();
        let mut s = session_with(obs, mutation, vec!["help"]);
        let err = s.run().await.unwrap_err();
        assert!(matches!(err, BrowseError::ConnectionFailed(_)));
        assert_eq!(s.state(), SessionState::Terminated);
        assert!(*obs_disconnects.lock().unwrap() >= 1);
        // No command ran; the mutation link never saw the origin.
        assert!(!calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| matches!(c, MutationCall::SetOrigin(_))));
    }

    #[tokio::test]
    async fn test_update_negotiates_encodes_and_sends() {
        let (mutation, calls) = MockMutationLink::new();
        // "1" selects the text kind; "hello world" is the value.
        let mut s = session_with(
            MockObservationLink::default(),
            mutation,
            vec!["1", "hello world"],
        );
        s.handle_line("update sensor.1 label").await.unwrap();

        let calls = calls.lock().unwrap();
        assert!(calls.contains(&MutationCall::RegisterSpec("label".to_string(), false)));
        let sent = calls
            .iter()
            .find_map(|c| match c {
                MutationCall::Update(a) => Some(a.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(sent.identifier, "sensor.1");
        assert_eq!(sent.name, "label");
        assert_eq!(sent.payload, b"hello world".to_vec());
        assert_eq!(sent.origin, "me");
    }

    #[tokio::test]
    async fn test_update_reuses_registered_type_without_prompting() {
        let (mutation, calls) = MockMutationLink::new();
        let mut s = session_with(
            MockObservationLink::default(),
            mutation,
            vec!["2", "41", "42"],
        );
        s.handle_line("update a counter").await.unwrap();
        // Second update only consumes the value line; no re-negotiation.
        s.handle_line("update a counter").await.unwrap();
        let sent = updates(&calls);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].payload, 42i64.to_be_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_update_negotiation_exhaustion_sends_nothing() {
        let (mutation, calls) = MockMutationLink::new();
        let mut s = session_with(
            MockObservationLink::default(),
            mutation,
            vec!["nope", "0", "100"],
        );
        let err = s.handle_line("update a b").await.unwrap_err();
        assert!(matches!(err, BrowseError::TypeNotRecognized { .. }));
        assert!(updates(&calls).is_empty());
    }

    #[tokio::test]
    async fn test_expire_accepts_length_valid_calendar_invalid_date() {
        let (mutation, calls) = MockMutationLink::new();
        // February 30th passes the pure length/digit check and rolls over.
        let mut s = session_with(
            MockObservationLink::default(),
            mutation,
            vec!["20230230", "120000"],
        );
        s.handle_line("expire sensor.1").await.unwrap();
        let calls = calls.lock().unwrap();
        let (id, ts, attr) = calls
            .iter()
            .find_map(|c| match c {
                MutationCall::Expire(id, ts, attr) => Some((id.clone(), *ts, attr.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(id, "sensor.1");
        assert_eq!(attr, None);
        // Rolls over to 2023-03-02T12:00:00Z.
        assert_eq!(ts, 1_677_758_400_000);
    }

    #[tokio::test]
    async fn test_expire_rejects_malformed_date_without_sending() {
        let (mutation, calls) = MockMutationLink::new();
        let mut s = session_with(
            MockObservationLink::default(),
            mutation,
            vec!["2023-02-01", "120000"],
        );
        let err = s.handle_line("expire sensor.1").await.unwrap_err();
        assert!(matches!(err, BrowseError::Usage(_)));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expire_and_rm_reject_extra_arguments() {
        let (mutation, calls) = MockMutationLink::new();
        let mut s = session_with(MockObservationLink::default(), mutation, vec![]);
        for line in ["expire a b c", "rm a b c"] {
            let err = s.handle_line(line).await.unwrap_err();
            assert!(matches!(err, BrowseError::Usage(_)));
        }
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rm_single_attribute() {
        let (mutation, calls) = MockMutationLink::new();
        let mut s = session_with(MockObservationLink::default(), mutation, vec![]);
        s.handle_line("rm sensor.1 temperature").await.unwrap();
        assert_eq!(
            calls.lock().unwrap()[0],
            MutationCall::Delete("sensor.1".to_string(), Some("temperature".to_string()))
        );
    }

    #[tokio::test]
    async fn test_touch_creates_each_identifier() {
        let (mutation, calls) = MockMutationLink::new();
        let mut s = session_with(MockObservationLink::default(), mutation, vec![]);
        s.handle_line("touch a b \"c d\"").await.unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                MutationCall::Create("a".to_string()),
                MutationCall::Create("b".to_string()),
                MutationCall::Create("c d".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_copy_shallow_counts_and_restores_origin() {
        let mut obs = MockObservationLink::default();
        let mut current = Snapshot::default();
        current.insert(attr("src", "alpha", "me"));
        current.insert(attr("src", "beta", "other"));
        current.insert(attr("src", "gamma", "me"));
        obs.current = current;
        let (mutation, calls) = MockMutationLink::new();

        let mut s = session_with(obs, mutation, vec![]);
        s.handle_line("cp src dst").await.unwrap();

        let sent = updates(&calls);
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|a| a.identifier == "dst"));
        // Per-record attribution was preserved.
        assert_eq!(
            sent.iter().map(|a| a.origin.as_str()).collect::<Vec<_>>(),
            vec!["me", "other", "me"]
        );
        let calls = calls.lock().unwrap();
        let origins: Vec<&str> = calls
            .iter()
            .filter_map(|c| match c {
                MutationCall::SetOrigin(o) => Some(o.as_str()),
                _ => None,
            })
            .collect();
        // Switched to "other" for the middle record, back to "me" before the
        // final one; the session origin is in force afterwards.
        assert_eq!(origins, vec!["other", "me"]);
        assert!(calls.contains(&MutationCall::RegisterSpec("beta".to_string(), false)));
    }

    #[tokio::test]
    async fn test_copy_shallow_partial_failure_reports_sent_count() {
        let mut obs = MockObservationLink::default();
        let mut current = Snapshot::default();
        current.insert(attr("src", "alpha", "me"));
        current.insert(attr("src", "beta", "me"));
        current.insert(attr("src", "gamma", "me"));
        obs.current = current;
        let (mut mutation, calls) = MockMutationLink::new();
        mutation.fail_update_at = Some(1);

        let mut s = session_with(obs, mutation, vec![]);
        let err = s.handle_line("cp src dst").await.unwrap_err();
        match err {
            BrowseError::CopyAborted { sent, .. } => assert_eq!(sent, 1),
            other => panic!("unexpected error: {other}"),
        }
        // No claim of success for the failed or unsent attributes.
        assert_eq!(updates(&calls).len(), 1);
    }

    #[tokio::test]
    async fn test_copy_failure_after_origin_switch_restores_session_origin() {
        let mut obs = MockObservationLink::default();
        let mut current = Snapshot::default();
        current.insert(attr("src", "alpha", "other"));
        current.insert(attr("src", "beta", "other"));
        obs.current = current;
        let (mut mutation, calls) = MockMutationLink::new();
        mutation.fail_update_at = Some(1);

        let mut s = session_with(obs, mutation, vec![]);
        let err = s.handle_line("cp src dst").await.unwrap_err();
        assert!(matches!(err, BrowseError::CopyAborted { sent: 1, .. }));

        // The switch to "other" must be undone even though the batch failed.
        let calls = calls.lock().unwrap();
        let origins: Vec<&str> = calls
            .iter()
            .filter_map(|c| match c {
                MutationCall::SetOrigin(o) => Some(o.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(origins, vec!["other", "me"]);
    }

    #[tokio::test]
    async fn test_copy_empty_source_writes_nothing() {
        let (mutation, calls) = MockMutationLink::new();
        let mut s = session_with(MockObservationLink::default(), mutation, vec![]);
        s.handle_line("cp src dst").await.unwrap();
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_copy_recursive_accumulates_across_snapshots() {
        let mut obs = MockObservationLink::default();
        let mut s1 = Snapshot::default();
        s1.insert(attr("src", "alpha", "me"));
        s1.insert(attr("src", "beta", "other"));
        let mut s2 = Snapshot::default();
        s2.insert(attr("src", "alpha", "me"));
        obs.range = vec![s1, s2];
        let (mutation, calls) = MockMutationLink::new();

        let mut s = session_with(obs, mutation, vec![]);
        s.handle_line("cp -r src dst").await.unwrap();

        let sent = updates(&calls);
        assert_eq!(sent.len(), 3);
        // Spec registration happens once per attribute name per command.
        let registrations = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MutationCall::RegisterSpec(_, _)))
            .count();
        assert_eq!(registrations, 2);
    }

    #[tokio::test]
    async fn test_copy_recursive_stream_fault_aborts_everything() {
        let mut obs = MockObservationLink::default();
        let mut s1 = Snapshot::default();
        s1.insert(attr("src", "alpha", "me"));
        let mut s2 = Snapshot::default();
        s2.insert(attr("src", "beta", "me"));
        obs.range = vec![s1, s2];
        obs.range_fail_after = Some((1, "range aborted".to_string()));
        let (mutation, calls) = MockMutationLink::new();

        let mut s = session_with(obs, mutation, vec![]);
        let err = s.handle_line("cp -r src dst").await.unwrap_err();
        assert!(matches!(err, BrowseError::StreamFault(_)));
        assert_eq!(updates(&calls).len(), 1);
    }

    #[tokio::test]
    async fn test_copy_recursive_send_failure_stops_stream_consumption() {
        let mut obs = MockObservationLink::default();
        let mut s1 = Snapshot::default();
        s1.insert(attr("src", "alpha", "me"));
        s1.insert(attr("src", "beta", "me"));
        let mut s2 = Snapshot::default();
        s2.insert(attr("src", "gamma", "me"));
        obs.range = vec![s1, s2];
        let (mut mutation, calls) = MockMutationLink::new();
        mutation.fail_update_at = Some(1);

        let mut s = session_with(obs, mutation, vec![]);
        let err = s.handle_line("cp -r src dst").await.unwrap_err();
        match err {
            BrowseError::CopyAborted { sent, .. } => assert_eq!(sent, 1),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(updates(&calls).len(), 1);
    }

    #[tokio::test]
    async fn test_search_lists_matches() {
        let mut obs = MockObservationLink::default();
        obs.search_results = vec!["sensor.1".to_string(), "sensor.2".to_string()];
        let (mutation, _calls) = MockMutationLink::new();
        let mut s = session_with(obs, mutation, vec![]);
        s.handle_line("search sensor\\..*").await.unwrap();
    }

    #[tokio::test]
    async fn test_history_drains_range() {
        let mut obs = MockObservationLink::default();
        let mut s1 = Snapshot::default();
        s1.insert(attr("a", "x", "me"));
        obs.range = vec![s1];
        let (mutation, _calls) = MockMutationLink::new();
        let mut s = session_with(obs, mutation, vec![]);
        s.handle_line("history a").await.unwrap();
    }

    #[tokio::test]
    async fn test_history_stream_fault_is_workflow_local() {
        let mut obs = MockObservationLink::default();
        obs.range_fail_after = Some((0, "boom".to_string()));
        let (mutation, _calls) = MockMutationLink::new();
        let mut s = session_with(obs, mutation, vec![]);
        let err = s.handle_line("history a").await.unwrap_err();
        assert!(matches!(err, BrowseError::StreamFault(_)));
        assert!(!err.is_fatal());
    }
}
