//! The merged, duplicate-free message list a UI renders.

use std::collections::HashSet;

use crate::message::Message;

/// Oldest-first messages with at most one entry per id.
///
/// History loads replace the window, live inserts append. A row seen
/// through both paths (or redelivered by the feed) is kept once.
#[derive(Debug, Default, Clone)]
pub struct MessageTimeline {
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly loaded history window.
    ///
    /// Entries already held that are newer than the newest history entry
    /// arrived after the fetch and are kept after it. If the window is
    /// empty, everything already held is kept.
    pub fn replace_history(&mut self, history: Vec<Message>) {
        let newest = history.iter().map(|m| m.created_at).max();
        let previous = std::mem::take(&mut self.messages);
        self.ids.clear();

        for msg in history {
            self.push(msg);
        }
        for msg in previous {
            let keep = match newest {
                Some(newest) => msg.created_at > newest,
                None => true,
            };
            if keep {
                self.push(msg);
            }
        }
    }

    /// Append a live message. Returns `false` if its id is already present.
    pub fn push(&mut self, msg: Message) -> bool {
        if !self.ids.insert(msg.id.clone()) {
            return false;
        }
        self.messages.push(msg);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        self.messages.retain(|m| m.id != id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
