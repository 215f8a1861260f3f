//! Sequential message numbering for Matrix rooms.
//!
//! Matrix event ids carry no order, while plugins address messages by
//! per-chat consecutive numbers (`base + offset`). Every message observed in
//! sync is assigned the next number of its room. Each room keeps at most
//! `capacity` messages; the oldest are forgotten first.

use std::collections::{BTreeMap, HashMap};

use plugin_core::{ChatMessage, MessageId};

#[derive(Debug)]
struct Stored {
    event_id: String,
    message: ChatMessage,
}

#[derive(Debug, Default)]
struct RoomTimeline {
    last_id: MessageId,
    by_event: HashMap<String, MessageId>,
    messages: BTreeMap<MessageId, Stored>,
}

#[derive(Debug)]
pub struct TimelineIndex {
    capacity: usize,
    rooms: HashMap<String, RoomTimeline>,
}

/// Result of [`TimelineIndex::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    pub id: MessageId,
    /// False when the event had been recorded before.
    pub fresh: bool,
}

impl TimelineIndex {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: HashMap::new(),
        }
    }

    /// Number `event_id` in `room`, building its message with the new id.
    pub fn record(
        &mut self,
        room: &str,
        event_id: &str,
        build: impl FnOnce(MessageId) -> ChatMessage,
    ) -> Recorded {
        let timeline = self.rooms.entry(room.to_owned()).or_default();
        if let Some(&id) = timeline.by_event.get(event_id) {
            return Recorded { id, fresh: false };
        }
        timeline.last_id += 1;
        let id = timeline.last_id;
        timeline.by_event.insert(event_id.to_owned(), id);
        timeline.messages.insert(
            id,
            Stored {
                event_id: event_id.to_owned(),
                message: build(id),
            },
        );
        while timeline.messages.len() > self.capacity {
            if let Some((_, old)) = timeline.messages.pop_first() {
                timeline.by_event.remove(&old.event_id);
            }
        }
        Recorded { id, fresh: true }
    }

    #[must_use]
    pub fn id_of(&self, room: &str, event_id: &str) -> Option<MessageId> {
        self.rooms.get(room)?.by_event.get(event_id).copied()
    }

    #[must_use]
    pub fn event_of(&self, room: &str, id: MessageId) -> Option<&str> {
        self.rooms
            .get(room)?
            .messages
            .get(&id)
            .map(|s| s.event_id.as_str())
    }

    #[must_use]
    pub fn get(&self, room: &str, id: MessageId) -> Option<&ChatMessage> {
        self.rooms.get(room)?.messages.get(&id).map(|s| &s.message)
    }

    /// Apply an edit to a recorded message; false if it is unknown.
    pub fn update(
        &mut self,
        room: &str,
        event_id: &str,
        apply: impl FnOnce(&mut ChatMessage),
    ) -> bool {
        let Some(timeline) = self.rooms.get_mut(room) else {
            return false;
        };
        let Some(id) = timeline.by_event.get(event_id) else {
            return false;
        };
        match timeline.messages.get_mut(id) {
            Some(stored) => {
                apply(&mut stored.message);
                true
            }
            None => false,
        }
    }

    /// Forget a deleted message. Its number is never reused.
    pub fn remove(&mut self, room: &str, id: MessageId) {
        if let Some(timeline) = self.rooms.get_mut(room)
            && let Some(stored) = timeline.messages.remove(&id)
        {
            timeline.by_event.remove(&stored.event_id);
        }
    }
}
