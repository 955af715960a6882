//! Append-only message log
//!
//! Messages are kept in insertion order, which is also chronological order
//! because sessions stamp messages as they are emitted. A per-conversation
//! index of log positions makes conversation views cheap to iterate.

use core::iter::FusedIterator;
use core::slice;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::message::{validate_parts, ConversationKey, Message, MessageId};
use crate::types::UserId;

// ----------------------------------------------------------------------------
// Message Store
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStoreStats {
    pub total_messages: usize,
    pub conversations: usize,
    pub duplicates_ignored: usize,
}

/// Ordered, append-only log of messages
///
/// The only in-place mutation is flipping a message's `read` flag.
#[derive(Debug, Default)]
pub struct MessageStore {
    log: Vec<Message>,
    by_id: HashMap<MessageId, usize>,
    conversations: HashMap<ConversationKey, Vec<usize>>,
    stats: MessageStoreStats,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` to the log
    ///
    /// Returns `Ok(false)` when a message with the same id is already stored.
    pub fn append(&mut self, message: Message) -> Result<bool> {
        validate_parts(&message.sender_id, &message.receiver_id, &message.body)?;

        if self.by_id.contains_key(&message.id) {
            self.stats.duplicates_ignored += 1;
            return Ok(false);
        }

        let position = self.log.len();
        let key = message.conversation_key();
        self.by_id.insert(message.id, position);

        let positions = self.conversations.entry(key).or_default();
        if positions.is_empty() {
            self.stats.conversations += 1;
        }
        positions.push(position);

        self.log.push(message);
        self.stats.total_messages += 1;
        Ok(true)
    }

    /// Messages exchanged between `self_id` and `partner_id`, in insertion order
    ///
    /// The iterator is lazy and can be cloned to restart from the same point.
    pub fn conversation_with(&self, self_id: &UserId, partner_id: &UserId) -> Conversation<'_> {
        let key = ConversationKey::new(self_id.clone(), partner_id.clone());
        let positions = self
            .conversations
            .get(&key)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Conversation {
            log: &self.log,
            positions: positions.iter(),
        }
    }

    /// Distinct senders that have messaged `for_id`, in first-seen order
    pub fn unique_counterparts(&self, for_id: &UserId) -> Vec<UserId> {
        let mut seen = HashSet::new();
        self.log
            .iter()
            .filter(|message| &message.receiver_id == for_id)
            .filter(|message| seen.insert(message.sender_id.clone()))
            .map(|message| message.sender_id.clone())
            .collect()
    }

    /// Mark a single message as read; `false` if unknown or already read
    pub fn mark_read(&mut self, id: &MessageId) -> bool {
        let Some(&position) = self.by_id.get(id) else {
            return false;
        };
        let message = &mut self.log[position];
        if message.read {
            return false;
        }
        message.read = true;
        true
    }

    /// Mark every message `partner` sent to `reader` as read
    pub fn mark_conversation_read(&mut self, reader: &UserId, partner: &UserId) -> usize {
        let key = ConversationKey::new(reader.clone(), partner.clone());
        let Some(positions) = self.conversations.get(&key) else {
            return 0;
        };
        let mut marked = 0;
        for &position in positions {
            let message = &mut self.log[position];
            if &message.receiver_id == reader && !message.read {
                message.read = true;
                marked += 1;
            }
        }
        marked
    }

    /// Unread messages `partner` sent to `reader`
    pub fn unread_count(&self, reader: &UserId, partner: &UserId) -> usize {
        self.conversation_with(reader, partner)
            .filter(|message| &message.receiver_id == reader && !message.read)
            .count()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.by_id.get(id).map(|&position| &self.log[position])
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Whole log in insertion order
    pub fn iter(&self) -> slice::Iter<'_, Message> {
        self.log.iter()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn stats(&self) -> &MessageStoreStats {
        &self.stats
    }
}

// ----------------------------------------------------------------------------
// Conversation View
// ----------------------------------------------------------------------------

/// Lazy view over one conversation
#[derive(Debug, Clone)]
pub struct Conversation<'a> {
    log: &'a [Message],
    positions: slice::Iter<'a, usize>,
}

impl<'a> Iterator for Conversation<'a> {
    type Item = &'a Message;

    fn next(&mut self) -> Option<Self::Item> {
        self.positions.next().map(|&position| &self.log[position])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.positions.size_hint()
    }
}

impl ExactSizeIterator for Conversation<'_> {}

impl FusedIterator for Conversation<'_> {}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
