use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::debug;

use super::domain::{ChatMessage, MessageId, Sender};
use super::identifiers::Generation;
use super::timeline::Timeline;

/// Timing for the simulated assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatConfig {
    pub reply_delay: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reply_delay: Duration::from_secs(2),
        }
    }
}

/// Lookup table of assistant copy, kept apart from the simulator so it can be swapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedReplies {
    greeting: String,
    replies: Vec<String>,
}

impl CannedReplies {
    pub fn new(greeting: impl Into<String>, replies: Vec<String>) -> Self {
        Self {
            greeting: greeting.into(),
            replies,
        }
    }

    pub fn standard() -> Self {
        Self::new(
            "Hi! I'm the hiring assistant. How can I help with your application?",
            [
                "Thanks for reaching out. Your application is moving through review.",
                "Each review stage updates on its own, no action is needed on your side.",
                "You will receive a confirmation e-mail once the process finishes.",
                "Your process number is shown at the top of the page for reference.",
                "Happy to help if anything about the next steps is unclear!",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        )
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.replies.get(index).map(String::as_str)
    }
}

impl Default for CannedReplies {
    fn default() -> Self {
        Self::standard()
    }
}

/// Picks which canned reply answers a message.
pub trait ReplySelector: Send {
    /// Return an index below `count`. Only called with `count > 0`.
    fn select(&mut self, count: usize) -> usize;
}

/// Uniform sampling over the reply table.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomReplySelector;

impl ReplySelector for RandomReplySelector {
    fn select(&mut self, count: usize) -> usize {
        rand::thread_rng().gen_range(0..count)
    }
}

/// Deterministic selector that walks the table in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct CyclingReplySelector {
    next: usize,
}

impl ReplySelector for CyclingReplySelector {
    fn select(&mut self, count: usize) -> usize {
        let index = self.next % count;
        self.next = self.next.wrapping_add(1);
        index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("chat message must not be empty")]
    EmptyMessage,
}

#[derive(Debug, Clone, Copy)]
struct PendingReply {
    generation: Generation,
    in_reply_to: MessageId,
}

/// Append-only message log with delayed assistant replies.
///
/// Independent of the stage machine: nothing here reads or writes the workflow stage.
pub struct ChatSimulator {
    generation: Generation,
    config: ChatConfig,
    replies: CannedReplies,
    selector: Box<dyn ReplySelector>,
    log: Vec<ChatMessage>,
    next_id: u64,
    pending: Timeline<PendingReply>,
}

impl fmt::Debug for ChatSimulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSimulator")
            .field("generation", &self.generation)
            .field("config", &self.config)
            .field("messages", &self.log.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl ChatSimulator {
    pub fn new(
        generation: Generation,
        config: ChatConfig,
        replies: CannedReplies,
        selector: Box<dyn ReplySelector>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut chat = Self {
            generation,
            config,
            replies,
            selector,
            log: Vec::new(),
            next_id: 1,
            pending: Timeline::default(),
        };
        chat.open(now);
        chat
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.log
    }

    pub fn pending_replies(&self) -> usize {
        self.pending.len()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending.next_deadline()
    }

    /// Clear the log and greet again. Replies still queued from before are dropped on fire.
    pub fn restart(&mut self, generation: Generation, now: DateTime<Utc>) {
        self.generation = generation;
        self.log.clear();
        self.open(now);
    }

    pub fn send_user_message(
        &mut self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<MessageId, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let id = self.append(Sender::User, text.to_string(), now);
        self.pending.schedule_after(
            now,
            self.config.reply_delay,
            PendingReply {
                generation: self.generation,
                in_reply_to: id,
            },
        );
        Ok(id)
    }

    /// Append replies whose delay has elapsed, in the order their timers complete.
    pub fn fire_due(&mut self, now: DateTime<Utc>) -> Vec<ChatMessage> {
        let mut delivered = Vec::new();

        while let Some((due, reply)) = self.pending.pop_due(now) {
            if reply.generation != self.generation {
                debug!(in_reply_to = reply.in_reply_to.0, "dropping reply from a previous session");
                continue;
            }
            if self.replies.is_empty() {
                continue;
            }

            let index = self.selector.select(self.replies.len());
            let body = self.replies.get(index).unwrap_or_default().to_string();
            self.append(Sender::Assistant, body, due);
            delivered.extend(self.log.last().cloned());
        }

        delivered
    }

    fn open(&mut self, now: DateTime<Utc>) {
        let greeting = self.replies.greeting().to_string();
        if !greeting.is_empty() {
            self.append(Sender::Assistant, greeting, now);
        }
    }

    fn append(&mut self, sender: Sender, body: String, sent_at: DateTime<Utc>) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.log.push(ChatMessage {
            id,
            sender,
            body,
            sent_at,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::onboarding::identifiers::next_generation;
    use crate::workflows::onboarding::timeline::offset;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 14, 32, 0).unwrap()
    }

    fn at_millis(ms: u64) -> DateTime<Utc> {
        offset(start(), Duration::from_millis(ms))
    }

    fn simulator() -> ChatSimulator {
        ChatSimulator::new(
            next_generation(),
            ChatConfig::default(),
            CannedReplies::standard(),
            Box::new(CyclingReplySelector::default()),
            start(),
        )
    }

    #[test]
    fn opens_with_greeting() {
        let chat = simulator();
        assert_eq!(chat.messages().len(), 1);
        assert_eq!(chat.messages()[0].id, MessageId(1));
        assert_eq!(chat.messages()[0].sender, Sender::Assistant);
    }

    #[test]
    fn blank_messages_are_rejected() {
        let mut chat = simulator();
        assert_eq!(chat.send_user_message("", start()), Err(ChatError::EmptyMessage));
        assert_eq!(
            chat.send_user_message(" \t\n", start()),
            Err(ChatError::EmptyMessage)
        );
        assert_eq!(chat.messages().len(), 1);
        assert_eq!(chat.pending_replies(), 0);
    }

    #[test]
    fn reply_arrives_after_delay() {
        let mut chat = simulator();
        let id = chat.send_user_message("hello", start()).expect("accepted");
        assert_eq!(id, MessageId(2));
        assert_eq!(chat.messages().len(), 2);

        assert!(chat.fire_due(at_millis(1_999)).is_empty());
        let replies = chat.fire_due(at_millis(2_000));
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].sender, Sender::Assistant);
        assert_eq!(replies[0].id, MessageId(3));
        assert_eq!(replies[0].sent_at, at_millis(2_000));
        assert_eq!(replies[0].body, CannedReplies::standard().get(0).unwrap());
    }

    #[test]
    fn overlapping_replies_each_resolve_in_timer_order() {
        let mut chat = simulator();
        chat.send_user_message("first", start()).expect("accepted");
        chat.send_user_message("second", at_millis(500)).expect("accepted");
        assert_eq!(chat.pending_replies(), 2);

        chat.fire_due(at_millis(10_000));
        let senders: Vec<_> = chat.messages().iter().map(|m| m.sender).collect();
        assert_eq!(
            senders,
            vec![
                Sender::Assistant,
                Sender::User,
                Sender::User,
                Sender::Assistant,
                Sender::Assistant,
            ]
        );
        let ids: Vec<_> = chat.messages().iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(chat.messages()[3].sent_at < chat.messages()[4].sent_at);
    }

    #[test]
    fn restart_drops_queued_replies() {
        let mut chat = simulator();
        chat.send_user_message("hello", start()).expect("accepted");
        chat.restart(next_generation(), at_millis(100));

        assert!(chat.fire_due(at_millis(5_000)).is_empty());
        assert_eq!(chat.messages().len(), 1);
        assert!(chat.messages()[0].id.0 > 2, "ids keep increasing across restarts");
    }

    #[test]
    fn empty_table_sends_no_reply() {
        let mut chat = ChatSimulator::new(
            next_generation(),
            ChatConfig::default(),
            CannedReplies::new("", Vec::new()),
            Box::new(RandomReplySelector),
            start(),
        );
        assert!(chat.messages().is_empty());
        chat.send_user_message("anyone there?", start()).expect("accepted");
        assert!(chat.fire_due(at_millis(2_000)).is_empty());
        assert_eq!(chat.messages().len(), 1);
    }

    #[test]
    fn random_selector_stays_in_bounds() {
        let mut selector = RandomReplySelector;
        for _ in 0..100 {
            assert!(selector.select(5) < 5);
        }
    }
}
