use super::conversation_state::{Message, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Text,
    Image,
    Multimodal,
}

impl EntryKind {
    fn of(message: &Message) -> Self {
        let has_text = !message.content.trim().is_empty();
        match (has_text, message.image.is_some()) {
            (true, true) => EntryKind::Multimodal,
            (false, true) => EntryKind::Image,
            _ => EntryKind::Text,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Text => "Text",
            EntryKind::Image => "Image",
            EntryKind::Multimodal => "Multimodal",
        }
    }
}

/// One user turn and the reply shown next to it
#[derive(Debug, Clone, Copy)]
pub struct HistoryEntry<'a> {
    pub prompt: &'a Message,
    pub kind: EntryKind,
    pub reply: Option<&'a Message>,
}

/// User messages in transcript order, each paired with its reply.
///
/// A reply that names the prompt through `in_reply_to` wins, so an image
/// and text sent together share the same reply. Unlinked
/// replies are paired by time: the first later assistant message whose
/// timestamp is not earlier than the prompt's.
pub fn history(messages: &[Message]) -> Vec<HistoryEntry<'_>> {
    messages
        .iter()
        .enumerate()
        .filter(|(_, message)| message.role == Role::User)
        .map(|(index, prompt)| HistoryEntry {
            prompt,
            kind: EntryKind::of(prompt),
            reply: linked_reply(messages, prompt).or_else(|| nearest_following_reply(&messages[index + 1..], prompt)),
        })
        .collect()
}

fn linked_reply<'a>(messages: &'a [Message], prompt: &Message) -> Option<&'a Message> {
    messages
        .iter()
        .find(|m| m.role == Role::Assistant && m.in_reply_to.contains(&prompt.id))
}

fn nearest_following_reply<'a>(later: &'a [Message], prompt: &Message) -> Option<&'a Message> {
    later.iter().find(|m| {
        m.role == Role::Assistant && m.in_reply_to.is_empty() && m.timestamp >= prompt.timestamp
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::attachment::tests::png;
    use crate::agri_client::AskResponse;
    use crate::cli::chat::composer::Submission;
    use crate::cli::chat::conversation_state::ConversationState;

    #[test]
    fn lists_user_turns_with_kinds() {
        let mut state = ConversationState::new();
        state.append_image_message(png("leaf.png"));
        state.append_message(Role::User, "what is this?", None);
        state.append_message(Role::Assistant, "Rust fungus.", Some("AgriGPT"));

        let entries = history(state.messages());
        let kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::Image, EntryKind::Text]);
    }

    #[test]
    fn image_and_text_turn_share_one_reply() {
        let mut state = ConversationState::new();
        let submission = Submission::new("what is this?", Some(png("leaf.png"))).unwrap();
        let pending = state.begin_request(&submission);
        let response = AskResponse {
            analysis: "Early blight".to_string(),
            request_id: None,
            status: None,
            input: None,
            elapsed_ms: None,
        };
        pending.succeed(&mut state, &response, "AgriGPT");

        let entries = history(state.messages());
        let pairs: Vec<_> = entries
            .iter()
            .map(|e| (e.kind, e.reply.map(|r| r.content.as_str())))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (EntryKind::Image, Some("Early blight")),
                (EntryKind::Text, Some("Early blight")),
            ]
        );
    }

    #[test]
    fn explicit_link_beats_timestamp_order() {
        let mut state = ConversationState::new();
        let first = state.append_message(Role::User, "first", None);
        let second = state.append_message(Role::User, "second", None);
        // replies resolve out of order
        state.append_reply(&[second], "answer two", "AgriGPT");
        state.append_reply(&[first], "answer one", "AgriGPT");

        let entries = history(state.messages());
        let pairs: Vec<_> = entries
            .iter()
            .map(|e| (e.prompt.content.as_str(), e.reply.map(|r| r.content.as_str())))
            .collect();
        assert_eq!(
            pairs,
            vec![("first", Some("answer one")), ("second", Some("answer two"))]
        );
    }

    #[test]
    fn unlinked_reply_pairs_with_next_assistant() {
        let mut state = ConversationState::new();
        state.append_message(Role::User, "soil?", None);
        state.append_message(Role::Assistant, "loam", Some("AgriGPT"));
        state.append_message(Role::User, "unanswered", None);

        let entries = history(state.messages());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reply.map(|r| r.content.as_str()), Some("loam"));
        assert!(entries[1].reply.is_none());
    }

    #[test]
    fn empty_transcript_has_no_history() {
        assert!(history(&[]).is_empty());
    }
}
