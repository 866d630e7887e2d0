use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Still receiving deltas; content may change
    pub is_partial: bool,
}

impl Message {
    fn sealed(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            created_at: Utc::now(),
            is_partial: false,
        }
    }
}

/// Ordered transcript built from incremental events
///
/// At most one assistant message is open at a time. A snapshot is published
/// on a watch channel after every mutation.
pub struct TranscriptAggregator {
    messages: Vec<Message>,
    open_assistant: Option<usize>,
    snapshot_tx: watch::Sender<Vec<Message>>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Vec::new());
        Self {
            messages: Vec::new(),
            open_assistant: None,
            snapshot_tx,
        }
    }

    /// Receiver that sees a fresh snapshot after each change
    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.snapshot_tx.subscribe()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Append a completed user utterance
    pub fn push_user(&mut self, text: &str) {
        debug!("User transcript: {}", text);
        self.messages.push(Message::sealed(Role::User, text.to_string()));
        self.publish();
    }

    /// Append a fragment to the open assistant message, opening one if needed
    pub fn push_assistant_delta(&mut self, delta: &str) {
        match self.open_assistant {
            Some(index) => self.messages[index].content.push_str(delta),
            None => {
                let mut message = Message::sealed(Role::Assistant, delta.to_string());
                message.is_partial = true;
                self.messages.push(message);
                self.open_assistant = Some(self.messages.len() - 1);
            }
        }
        self.publish();
    }

    /// Seal the open assistant message with the authoritative text
    ///
    /// The final text replaces whatever the deltas accumulated. Without an
    /// open message a new sealed one is appended.
    pub fn seal_assistant(&mut self, transcript: &str) {
        match self.open_assistant.take() {
            Some(index) => {
                let message = &mut self.messages[index];
                if message.content != transcript {
                    debug!(
                        "Final transcript differs from deltas ({:?} -> {:?})",
                        message.content, transcript
                    );
                }
                message.content = transcript.to_string();
                message.is_partial = false;
            }
            None => {
                self.messages
                    .push(Message::sealed(Role::Assistant, transcript.to_string()));
            }
        }
        self.publish();
    }

    /// Seal the open assistant message as it stands
    ///
    /// Used when the session ends before the service finished the response.
    pub fn seal_open(&mut self) {
        if let Some(index) = self.open_assistant.take() {
            self.messages[index].is_partial = false;
            self.publish();
        }
    }

    pub fn has_open_assistant(&self) -> bool {
        self.open_assistant.is_some()
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.messages.clone());
    }
}

impl Default for TranscriptAggregator {
    fn default() -> Self {
        Self::new()
    }
}
