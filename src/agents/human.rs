//! Line-oriented human participant

use super::{Participant, ParticipantError, ParticipantErrorKind, ParticipantReply};
use crate::state_machine::{Message, ParticipantId};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;

/// Human reading replies from the terminal
pub type ConsoleHuman = LineHuman<BufReader<Stdin>>;

impl ConsoleHuman {
    pub fn stdin(sentinel: impl Into<String>) -> Self {
        LineHuman::new(BufReader::new(tokio::io::stdin()), sentinel).with_prompt("You: ")
    }
}

/// Human whose replies are lines from a reader. End of input is treated as
/// the termination sentinel so a closed input ends the session.
pub struct LineHuman<R> {
    reader: Mutex<R>,
    sentinel: String,
    prompt: Option<String>,
}

impl<R> LineHuman<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, sentinel: impl Into<String>) -> Self {
        Self {
            reader: Mutex::new(reader),
            sentinel: sentinel.into(),
            prompt: None,
        }
    }

    /// Print `prompt` on stderr before waiting for input
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    fn input_error(e: &std::io::Error) -> ParticipantError {
        ParticipantError::new(
            ParticipantId::Human,
            ParticipantErrorKind::Input,
            format!("Failed to read input: {e}"),
        )
    }
}

#[async_trait]
impl<R> Participant for LineHuman<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn id(&self) -> ParticipantId {
        ParticipantId::Human
    }

    async fn reply(&self, _history: &[Message]) -> Result<ParticipantReply, ParticipantError> {
        let mut reader = self.reader.lock().await;

        loop {
            if let Some(prompt) = &self.prompt {
                let mut stderr = tokio::io::stderr();
                stderr
                    .write_all(prompt.as_bytes())
                    .await
                    .map_err(|e| Self::input_error(&e))?;
                stderr.flush().await.map_err(|e| Self::input_error(&e))?;
            }

            let mut line = String::new();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| Self::input_error(&e))?;

            if read == 0 {
                tracing::info!("Human input closed");
                return Ok(ParticipantReply::dialogue(self.sentinel.clone()));
            }

            let line = line.trim();
            if !line.is_empty() {
                return Ok(ParticipantReply::dialogue(line));
            }
        }
    }
}
