use crate::session::UserId;

/// A user message as seen by the pipeline, identical for polling and webhook delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: UserId,
    pub chat_id: i64,
    pub message_id: i32,
    /// Message text, or the transcript of a voice note.
    pub text: String,
}

impl InboundMessage {
    pub fn new(user_id: UserId, chat_id: i64, message_id: i32, text: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id,
            message_id,
            text: text.into(),
        }
    }
}
