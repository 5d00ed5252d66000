use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::composer::Submission;
use crate::agri_client::{ApiError, AskResponse};
use crate::attachment::ImageBlob;
use crate::cli::local_images::{ImageRef, LocalImages};

/// Transcript capacity. Older messages are dropped first.
pub const MAX_MESSAGES: usize = 200;

/// Shown when a failure arrives without any usable text
const DEFAULT_FAILURE: &str = "Failed to get response";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Only ever set on user messages
    pub image: Option<ImageRef>,
    /// Only ever set on assistant messages
    pub agent_label: Option<String>,
    /// The user messages of the request an assistant reply answers
    pub in_reply_to: Vec<MessageId>,
}

impl Message {
    fn new(role: Role, content: &str) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            image: None,
            agent_label: None,
            in_reply_to: Vec::new(),
        }
    }
}

/// The transcript plus the request flags shown by the views.
///
/// One instance lives for the whole session and is passed by reference to
/// whatever renders or mutates it. Every operation is synchronous and total.
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    images: LocalImages,
    is_loading: bool,
    last_error: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message stamped with a fresh id and the current time.
    ///
    /// The agent label is kept for assistant messages only.
    pub fn append_message(&mut self, role: Role, content: &str, agent_label: Option<&str>) -> MessageId {
        let mut message = Message::new(role, content);
        if role == Role::Assistant {
            message.agent_label = agent_label.map(str::to_string);
        }
        self.push(message)
    }

    /// Append an assistant message answering the user messages `in_reply_to`.
    pub fn append_reply(&mut self, in_reply_to: &[MessageId], content: &str, agent_label: &str) -> MessageId {
        let mut message = Message::new(Role::Assistant, content);
        message.agent_label = Some(agent_label.to_string());
        message.in_reply_to = in_reply_to.to_vec();
        self.push(message)
    }

    /// Append a user message with no text carrying `blob` as a local image.
    pub fn append_image_message(&mut self, blob: ImageBlob) -> MessageId {
        let mut message = Message::new(Role::User, "");
        message.image = Some(self.images.create(blob));
        self.push(message)
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.last_error = error;
    }

    /// Drop the whole transcript, releasing every image it held.
    ///
    /// `is_loading` is left alone.
    pub fn clear_conversation(&mut self) {
        for message in self.messages.drain(..) {
            if let Some(image) = &message.image {
                self.images.revoke(image);
            }
        }
        self.last_error = None;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn image(&self, image_ref: &ImageRef) -> Option<&ImageBlob> {
        self.images.resolve(image_ref)
    }

    /// Number of image resources still held by the transcript
    #[cfg(test)]
    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    /// Enter the pending state: flags go up and the user's side of the
    /// exchange is appended before the call resolves (image first, then text).
    pub fn begin_request(&mut self, submission: &Submission) -> PendingRequest {
        self.set_loading(true);
        self.set_error(None);

        let mut user_messages = Vec::with_capacity(2);
        if let Some(image) = submission.image() {
            user_messages.push(self.append_image_message(image.clone()));
        }
        if !submission.text().is_empty() {
            user_messages.push(self.append_message(Role::User, submission.text(), None));
        }

        PendingRequest { user_messages }
    }

    fn push(&mut self, message: Message) -> MessageId {
        let id = message.id;
        tracing::debug!("Appending {} message {}", message.role.as_str(), id);
        self.messages.push(message);

        if self.messages.len() > MAX_MESSAGES {
            let excess = self.messages.len() - MAX_MESSAGES;
            for evicted in self.messages.drain(..excess) {
                if let Some(image) = &evicted.image {
                    self.images.revoke(image);
                }
            }
        }

        id
    }
}

/// A request between `begin_request` and its outcome.
///
/// Optimistic user messages stay in the transcript whichever way it ends.
#[derive(Debug)]
#[must_use = "a pending request must end with `succeed` or `fail`"]
pub struct PendingRequest {
    user_messages: Vec<MessageId>,
}

impl PendingRequest {
    pub fn user_messages(&self) -> &[MessageId] {
        &self.user_messages
    }

    /// Append the reply, linked to every user message of this request.
    pub fn succeed(self, state: &mut ConversationState, response: &AskResponse, agent_label: &str) -> MessageId {
        let reply = if self.user_messages.is_empty() {
            state.append_message(Role::Assistant, &response.analysis, Some(agent_label))
        } else {
            state.append_reply(&self.user_messages, &response.analysis, agent_label)
        };
        state.set_loading(false);
        reply
    }

    /// Record the failure. The transcript is not touched.
    pub fn fail(self, state: &mut ConversationState, error: &ApiError) {
        let message = if error.message.trim().is_empty() {
            DEFAULT_FAILURE.to_string()
        } else {
            error.message.clone()
        };
        state.set_error(Some(message));
        state.set_loading(false);
    }
}
