//! Command grammar and handlers
//!
//! The first token of a line maps case-insensitively onto a `Command`
//! variant; everything the handler needs travels inside the variant. Handlers
//! return errors instead of printing them, so the session loop is the single
//! place that decides between a one-line report and termination.

use std::collections::HashSet;
use std::io::Write as _;

use chrono::{NaiveDate, NaiveTime, TimeDelta};

use crate::error::{BrowseError, Result};
use crate::link::stream::next_snapshot;
use crate::link::{LinkPair, MutationLink, ObservationLink};
use crate::model::{now_ms, Attribute};
use crate::registry::negotiate_kind;

use super::Session;

/// Command table printed by `help`.
pub const HELP_MSG: &str = "\
Command - Usage
help - Print this information
search ID_REGEX [ID_REGEX...] - Search for Identifiers matching a regular expression
status ID_REGEX [ID_REGEX...] - Show the current Attributes of matching Identifiers
history ID_REGEX [ID_REGEX...] - Stream the full history of matching Identifiers
touch ID [ID...] - Create Identifiers
update ID ATTR - Write a new Attribute value (prompts for the value)
expire ID [ATTR] - Expire an Identifier or one Attribute (prompts for date and time)
rm ID [ATTR] - Delete an Identifier or one Attribute
cp [-r] SRC_ID DST_ID - Copy current Attributes; -r copies the full history
quit | exit - Exit the application";

/// One parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Search(Vec<String>),
    Status(Vec<String>),
    History(Vec<String>),
    Touch(Vec<String>),
    Update { id: String, attr: String },
    Expire { id: String, attr: Option<String> },
    Remove { id: String, attr: Option<String> },
    Copy {
        recursive: bool,
        src: String,
        dst: String,
    },
}

impl Command {
    /// Map a token list onto a command. The keyword is matched
    /// case-insensitively; an empty list and argument-count problems come
    /// back as usage errors before any network call.
    pub fn parse(tokens: &[String]) -> Result<Command> {
        let Some(first) = tokens.first() else {
            return Err(BrowseError::usage(
                "Type \"help\" for a list of commands.",
            ));
        };
        let keyword = first.to_ascii_lowercase();
        let args = &tokens[1..];
        match keyword.as_str() {
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            "search" => Self::regex_list(args, "search").map(Command::Search),
            "status" => Self::regex_list(args, "status").map(Command::Status),
            "history" => Self::regex_list(args, "history").map(Command::History),
            "touch" => {
                if args.is_empty() {
                    Err(BrowseError::usage("Usage: touch ID [ID...]"))
                } else {
                    Ok(Command::Touch(args.to_vec()))
                }
            }
            "update" => match args {
                [id, attr] => Ok(Command::Update {
                    id: id.clone(),
                    attr: attr.clone(),
                }),
                _ => Err(BrowseError::usage("Usage: update ID ATTR")),
            },
            "expire" => Self::id_and_optional_attr(args, "expire")
                .map(|(id, attr)| Command::Expire { id, attr }),
            "rm" => Self::id_and_optional_attr(args, "rm")
                .map(|(id, attr)| Command::Remove { id, attr }),
            "cp" => {
                let (recursive, rest) = match args.first().map(String::as_str) {
                    Some("-r") => (true, &args[1..]),
                    _ => (false, args),
                };
                match rest {
                    [src, dst] => Ok(Command::Copy {
                        recursive,
                        src: src.clone(),
                        dst: dst.clone(),
                    }),
                    _ => Err(BrowseError::usage("Usage: cp [-r] SRC_ID DST_ID")),
                }
            }
            other => Err(BrowseError::usage(format!(
                "Command not found \"{other}\".\nType \"help\" for a list of commands."
            ))),
        }
    }

    fn regex_list(args: &[String], keyword: &str) -> Result<Vec<String>> {
        if args.is_empty() {
            Err(BrowseError::usage(format!(
                "Missing regular expression. Usage: {keyword} ID_REGEX [ID_REGEX...]"
            )))
        } else {
            Ok(args.to_vec())
        }
    }

    /// `expire` and `rm` take one or two arguments; anything more is a
    /// usage error for these two commands specifically.
    fn id_and_optional_attr(args: &[String], keyword: &str) -> Result<(String, Option<String>)> {
        match args {
            [id] => Ok((id.clone(), None)),
            [id, attr] => Ok((id.clone(), Some(attr.clone()))),
            _ => Err(BrowseError::usage(format!("Usage: {keyword} ID [ATTR]"))),
        }
    }
}

impl Session {
    pub(super) async fn cmd_search(&mut self, regexes: Vec<String>) -> Result<()> {
        for regex in &regexes {
            println!("Searching Identifiers for \"{regex}\"...");
            let ids = self.links.observation.search_ids(regex).await?;
            if ids.is_empty() {
                self.out.print_no_data();
            } else {
                for id in &ids {
                    self.out.print_identifier(id);
                }
            }
        }
        Ok(())
    }

    pub(super) async fn cmd_status(&mut self, regexes: Vec<String>) -> Result<()> {
        for regex in &regexes {
            let snapshot = self
                .links
                .observation
                .current_state(regex, ".*")
                .await?;
            if snapshot.is_empty() {
                self.out.print_no_data();
            } else {
                self.out.print_snapshot(&snapshot, &self.registry);
            }
        }
        Ok(())
    }

    pub(super) async fn cmd_history(&mut self, regexes: Vec<String>) -> Result<()> {
        let to_ms = now_ms();
        for regex in &regexes {
            let LinkPair { observation, .. } = &mut self.links;
            let out = &self.out;
            let registry = &self.registry;
            let mut cursor = observation.range_stream(regex, 0, to_ms, ".*").await?;
            let rendered = crate::link::stream::drain(cursor.as_mut(), |i, snapshot| {
                if i > 0 {
                    out.print_snapshot_separator();
                }
                out.print_snapshot(snapshot, registry);
            })
            .await?;
            if rendered == 0 {
                out.print_no_data();
            }
        }
        Ok(())
    }

    pub(super) async fn cmd_touch(&mut self, ids: Vec<String>) -> Result<()> {
        for id in &ids {
            self.links.mutation.create_identifier(id).await?;
            println!("Created \"{id}\".");
        }
        Ok(())
    }

    pub(super) async fn cmd_update(&mut self, id: String, attr: String) -> Result<()> {
        let kind = negotiate_kind(&mut self.registry, &attr, self.input.as_mut())?;
        let text = self.prompt_field(&format!("Value for \"{attr}\" ({}): ", kind.label()))?;
        let payload = kind.encode(&text)?;
        self.links
            .mutation
            .register_attribute_spec(&attr, false)
            .await?;
        let attribute = Attribute {
            identifier: id.clone(),
            name: attr.clone(),
            created_ms: now_ms(),
            payload,
            origin: self.config.origin.clone(),
        };
        self.links.mutation.update_attribute(&attribute).await?;
        println!("Updated \"{id}\" / \"{attr}\".");
        Ok(())
    }

    pub(super) async fn cmd_expire(&mut self, id: String, attr: Option<String>) -> Result<()> {
        let date = self.prompt_field("Expiration date (YYYYMMDD): ")?;
        let time = self.prompt_field("Expiration time (HHMMSS): ")?;
        let ts_ms = lenient_timestamp_ms(date.trim(), time.trim())?;
        self.links.mutation.expire(&id, ts_ms, attr.as_deref()).await?;
        match &attr {
            Some(a) => println!("Expired \"{id}\" / \"{a}\"."),
            None => println!("Expired \"{id}\"."),
        }
        Ok(())
    }

    pub(super) async fn cmd_remove(&mut self, id: String, attr: Option<String>) -> Result<()> {
        self.links.mutation.delete(&id, attr.as_deref()).await?;
        match &attr {
            Some(a) => println!("Deleted \"{id}\" / \"{a}\"."),
            None => println!("Deleted \"{id}\"."),
        }
        Ok(())
    }

    pub(super) async fn cmd_copy(&mut self, recursive: bool, src: String, dst: String) -> Result<()> {
        let copied = if recursive {
            self.copy_recursive(&src, &dst).await?
        } else {
            self.copy_shallow(&src, &dst).await?
        };
        match copied {
            None => println!("Source \"{src}\" is empty; nothing copied."),
            Some(n) => println!("Copied {n} attribute(s) from \"{src}\" to \"{dst}\"."),
        }
        Ok(())
    }

    /// Copy the current Snapshot of `src`. Returns `None` for an empty
    /// source, which callers report distinctly from a send failure.
    async fn copy_shallow(&mut self, src: &str, dst: &str) -> Result<Option<usize>> {
        let snapshot = self.links.observation.current_state(src, ".*").await?;
        let attrs: Vec<Attribute> = snapshot.attributes().cloned().collect();
        if attrs.is_empty() {
            return Ok(None);
        }

        let session_origin = self.config.origin.clone();
        let mut current_origin = session_origin.clone();
        let mut registered = HashSet::new();
        let mut sent = 0;
        let result = send_batch(
            self.links.mutation.as_mut(),
            &mut current_origin,
            dst,
            &attrs,
            &mut registered,
            &mut sent,
        )
        .await;
        restore_origin(self.links.mutation.as_mut(), &session_origin, &current_origin).await;
        result.map(|_| Some(sent))
    }

    /// Copy every Snapshot in the full historical range of `src`. One
    /// Attribute failure aborts the whole operation, including the unread
    /// remainder of the stream; Attributes already sent stay written.
    async fn copy_recursive(&mut self, src: &str, dst: &str) -> Result<Option<usize>> {
        let to_ms = now_ms();
        let session_origin = self.config.origin.clone();
        let mut current_origin = session_origin.clone();
        let mut registered = HashSet::new();
        let mut sent = 0;
        let mut saw_attributes = false;

        let LinkPair {
            observation,
            mutation,
        } = &mut self.links;
        let mut cursor = observation.range_stream(src, 0, to_ms, ".*").await?;
        let result: Result<()> = async {
            while let Some(snapshot) = next_snapshot(cursor.as_mut()).await? {
                let attrs: Vec<Attribute> = snapshot.attributes().cloned().collect();
                if attrs.is_empty() {
                    continue;
                }
                saw_attributes = true;
                send_batch(
                    mutation.as_mut(),
                    &mut current_origin,
                    dst,
                    &attrs,
                    &mut registered,
                    &mut sent,
                )
                .await?;
            }
            Ok(())
        }
        .await;
        drop(cursor);
        restore_origin(mutation.as_mut(), &session_origin, &current_origin).await;
        result?;
        if !saw_attributes {
            return Ok(None);
        }
        Ok(Some(sent))
    }

    /// Print a prompt and block for the operator's answer.
    fn prompt_field(&mut self, prompt: &str) -> Result<String> {
        print!("{prompt}");
        std::io::stdout().flush().ok();
        self.input
            .next_line_blocking()
            .ok_or_else(|| BrowseError::usage("Input closed before the value was supplied."))
    }
}

/// Send one batch of Attributes to `dst`, preserving each record's recorded
/// origin by temporarily switching the Mutation Link when it differs from
/// the one currently in force. Stops at the first failure; `sent` counts
/// only confirmed sends.
async fn send_batch(
    mutation: &mut dyn MutationLink,
    current_origin: &mut String,
    dst: &str,
    attrs: &[Attribute],
    registered: &mut HashSet<String>,
    sent: &mut usize,
) -> Result<()> {
    let abort = |sent: usize| move |e: BrowseError| BrowseError::CopyAborted {
        sent,
        reason: e.to_string(),
    };
    for attr in attrs {
        if registered.insert(attr.name.clone()) {
            mutation
                .register_attribute_spec(&attr.name, false)
                .await
                .map_err(abort(*sent))?;
        }
        if attr.origin != *current_origin {
            mutation
                .set_origin(&attr.origin)
                .await
                .map_err(abort(*sent))?;
            *current_origin = attr.origin.clone();
        }
        mutation
            .update_attribute(&attr.retargeted(dst))
            .await
            .map_err(abort(*sent))?;
        *sent += 1;
    }
    Ok(())
}

/// Put the session's own origin back in force after a copy batch, whether it
/// succeeded or failed. A restore failure is logged, not raised; the next
/// write would surface it anyway.
async fn restore_origin(mutation: &mut dyn MutationLink, session_origin: &str, current_origin: &str) {
    if current_origin != session_origin {
        if let Err(e) = mutation.set_origin(session_origin).await {
            tracing::warn!("failed to restore session origin: {e}");
        }
    }
}

/// Combine an 8-digit date and a 6-digit time into one epoch-ms instant.
///
/// Validation is purely length/digit based: calendar-invalid values such as
/// month 13 or February 30th are accepted and roll over arithmetically into
/// the following month or year, matching the lenient behavior this tool has
/// always had.
pub(crate) fn lenient_timestamp_ms(date: &str, time: &str) -> Result<i64> {
    check_digits(date, 8, "date (YYYYMMDD)")?;
    check_digits(time, 6, "time (HHMMSS)")?;

    let num = |s: &str| -> i64 { s.parse().unwrap_or(0) };
    let year = num(&date[0..4]);
    let month = num(&date[4..6]);
    let day = num(&date[6..8]);
    let secs = num(&time[0..2]) * 3600 + num(&time[2..4]) * 60 + num(&time[4..6]);

    // Month 0 or 13+ rolls across year boundaries; day 0 or past the month
    // end rolls across month boundaries.
    let months = month - 1;
    let year = year + months.div_euclid(12);
    let month = months.rem_euclid(12) as u32 + 1;
    let first = NaiveDate::from_ymd_opt(year as i32, month, 1)
        .ok_or_else(|| BrowseError::usage("Expiration date is out of range."))?;
    let instant =
        (first + TimeDelta::days(day - 1)).and_time(NaiveTime::MIN) + TimeDelta::seconds(secs);
    Ok(instant.and_utc().timestamp_millis())
}

fn check_digits(value: &str, len: usize, what: &str) -> Result<()> {
    if value.len() != len || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BrowseError::usage(format!(
            "The {what} must be exactly {len} digits."
        )));
    }
    Ok(())
}
