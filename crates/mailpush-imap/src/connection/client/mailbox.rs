//! Commands run on a ready connection.

use super::Connection;
use crate::command::{Command, SequenceCommand, names as commands};
use crate::connection::stream::Connector;
use crate::error::NegativeResponse;
use crate::model::{ListResponse, QresyncParams, SearchResponse, SelectOrExamineResponse};
use crate::parser::Response;
use crate::types::Status;
use crate::types::capability::names;
use crate::{Error, Result};

impl<C: Connector> Connection<C> {
    /// Sends NOOP, returning any untagged updates it flushed out.
    pub async fn noop(&mut self) -> Result<Vec<Response>> {
        self.execute(&Command::Noop).await
    }

    /// Selects `mailbox` read-write.
    ///
    /// QRESYNC parameters are only sent when the server supports QRESYNC; it
    /// is enabled on first use.
    pub async fn select(
        &mut self,
        mailbox: &str,
        qresync: Option<QresyncParams>,
    ) -> Result<SelectOrExamineResponse> {
        self.open_mailbox(mailbox, qresync, false).await
    }

    /// Opens `mailbox` read-only.
    pub async fn examine(
        &mut self,
        mailbox: &str,
        qresync: Option<QresyncParams>,
    ) -> Result<SelectOrExamineResponse> {
        self.open_mailbox(mailbox, qresync, true).await
    }

    async fn open_mailbox(
        &mut self,
        mailbox: &str,
        qresync: Option<QresyncParams>,
        read_only: bool,
    ) -> Result<SelectOrExamineResponse> {
        let qresync = match qresync {
            Some(params) if self.enable_qresync().await? => Some(params),
            _ => None,
        };
        let mailbox = mailbox.to_string();
        let command = if read_only {
            Command::Examine { mailbox, qresync }
        } else {
            Command::Select { mailbox, qresync }
        };
        let responses = self.execute(&command).await?;
        Ok(SelectOrExamineResponse::parse(
            &responses,
            self.qresync_enabled,
        ))
    }

    /// Sends `ENABLE QRESYNC` once. Returns whether QRESYNC is in effect.
    pub async fn enable_qresync(&mut self) -> Result<bool> {
        if self.qresync_enabled {
            return Ok(true);
        }
        if !self.has_capability(names::QRESYNC) {
            return Ok(false);
        }

        let command = Command::Enable {
            capabilities: vec![names::QRESYNC.to_string()],
        };
        match self.execute(&command).await {
            Ok(_) => {
                self.qresync_enabled = true;
                Ok(true)
            }
            Err(Error::Negative(negative)) => {
                tracing::warn!(conn = %self.log_id, response = %negative, "ENABLE QRESYNC rejected");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Lists mailboxes matching `pattern` under `reference`.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        let command = Command::List {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
        };
        let responses = self.execute(&command).await?;
        Ok(ListResponse::parse_list(&responses))
    }

    /// Runs `UID SEARCH <criteria>` and returns the matching UIDs.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] if the SEARCH data holds a token that is not a
    /// number.
    pub async fn uid_search(&mut self, criteria: &str) -> Result<Vec<u64>> {
        let command = Command::UidSearch {
            criteria: criteria.to_string(),
        };
        let responses = self.execute(&command).await?;
        SearchResponse::parse(&responses)
            .map(SearchResponse::into_ids)
            .ok_or_else(|| Error::Protocol("malformed SEARCH response".to_string()))
    }

    /// Runs a command given as text, e.g. `UID EXPUNGE 4:7`.
    pub async fn execute_simple_command(&mut self, command: &str) -> Result<Vec<Response>> {
        self.execute(&Command::Raw(command.to_string())).await
    }

    /// Splits `command` to the configured line length and runs every part,
    /// concatenating the responses.
    pub async fn execute_split(&mut self, command: &SequenceCommand) -> Result<Vec<Response>> {
        let lines = command.split(self.settings.max_command_length)?;
        let mut responses = Vec::new();
        for line in lines {
            responses.extend(self.execute(&Command::Raw(line)).await?);
        }
        Ok(responses)
    }

    /// Enters IDLE.
    ///
    /// Returns the untagged data the server sent before accepting. Updates
    /// then arrive through [`read_response`](Self::read_response) until
    /// [`done`](Self::done) is called.
    pub async fn idle(&mut self) -> Result<Vec<Response>> {
        if self.idle_tag.is_some() {
            return Err(Error::InvalidState("already idling".to_string()));
        }

        let tag = self.send_command(&Command::Idle).await?;
        let mut untagged = Vec::new();
        loop {
            let response = self.read_response(None).await?;
            if response.is_continuation() {
                self.idle_tag = Some(tag);
                return Ok(untagged);
            }
            match response.tag() {
                Some(completion) if completion == tag => {
                    let refused = response.status() != Some(Status::Ok);
                    untagged.push(response);
                    if refused {
                        return Err(NegativeResponse::new(commands::IDLE.to_string(), untagged).into());
                    }
                    return Err(Error::Protocol(
                        "IDLE completed without a continuation request".to_string(),
                    ));
                }
                Some(stale) => {
                    tracing::warn!(conn = %self.log_id, received = stale, "Discarding response with stale tag");
                }
                None => untagged.push(response),
            }
        }
    }

    /// Leaves IDLE and returns everything read until its completion.
    pub async fn done(&mut self) -> Result<Vec<Response>> {
        let tag = self
            .idle_tag
            .take()
            .ok_or_else(|| Error::InvalidState("not idling".to_string()))?;
        self.write_line(&Command::Done.serialize(""), commands::DONE)
            .await?;
        self.read_status_response(&tag, commands::IDLE, &mut ())
            .await
    }
}
