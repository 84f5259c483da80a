//! The conversation as the pipeline sees it.

use crate::Message;

/// Ordered message history for one agent run.
///
/// The driver only ever appends. Pipeline stages receive the state by value
/// and hand back a new one; they may rewrite message *content* but get no
/// way to insert, remove, or reorder messages.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Append a message to the end of the history.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// In-place access for stages. A slice keeps the length fixed.
    pub(crate) fn messages_mut(&mut self) -> &mut [Message] {
        &mut self.messages
    }

    /// Rewrite textual fragments across every message.
    ///
    /// `f` sees each fragment (string content, bare string list element, or
    /// the `text` field of a structured part) and returns `Some(replacement)`
    /// to rewrite it or `None` to leave it alone. Non-text parts are never
    /// passed to `f`. Returns the number of fragments rewritten.
    pub fn rewrite_text(&mut self, mut f: impl FnMut(&str) -> Option<String>) -> usize {
        let mut rewritten = 0;
        for msg in self.messages.iter_mut() {
            if let Some(content) = msg.content.as_mut() {
                content.for_each_text_mut(|fragment| {
                    if let Some(replacement) = f(fragment) {
                        *fragment = replacement;
                        rewritten += 1;
                    }
                });
            }
        }
        rewritten
    }
}

impl From<Vec<Message>> for ConversationState {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContentPart, MessageContent};

    #[test]
    fn rewrite_visits_every_text_shape() {
        let mut state = ConversationState::new(vec![
            Message::user("plain"),
            Message::tool_result(
                "c1",
                MessageContent::Parts(vec![
                    ContentPart::Raw("raw".into()),
                    ContentPart::text("block"),
                    ContentPart::image_url("data:image/png;base64,AAAA"),
                ]),
            ),
        ]);

        let mut seen = Vec::new();
        let n = state.rewrite_text(|s| {
            seen.push(s.to_string());
            Some(s.to_uppercase())
        });

        assert_eq!(seen, vec!["plain", "raw", "block"]);
        assert_eq!(n, 3);
        assert_eq!(state.messages()[0].text(), Some("PLAIN"));
        let joined = state.messages()[1].content.as_ref().unwrap().joined_text();
        assert_eq!(joined, "RAW\nBLOCK");
    }

    #[test]
    fn rewrite_never_changes_length_or_order() {
        let mut state = ConversationState::new(vec![
            Message::system("a"),
            Message::user("b"),
            Message::assistant_text("c"),
        ]);
        state.rewrite_text(|_| Some(String::new()));
        assert_eq!(state.len(), 3);
        let roles: Vec<String> = state.messages().iter().map(|m| m.role.to_string()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }
}
