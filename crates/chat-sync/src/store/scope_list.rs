//! One scope's message list plus its pagination state

use chat_core::{Message, MessageId};

/// What [`ScopeList::upsert`] did with a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Upsert {
    Inserted,
    Updated,
    /// Already held, and the held copy is at least as new
    Unchanged,
}

/// Messages of one scope, ascending by `(created_at, id)`, one entry per id
#[derive(Debug, Clone, Default)]
pub struct ScopeList {
    messages: Vec<Message>,
    has_more: bool,
    loaded: bool,
}

impl ScopeList {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether older history may exist on the server
    #[inline]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Whether the initial page has been applied
    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub(crate) fn set_has_more(&mut self, has_more: bool) {
        self.has_more = has_more;
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    /// Pagination cursor: the oldest server-confirmed message
    pub fn cursor(&self) -> Option<&MessageId> {
        self.messages
            .iter()
            .find(|m| !m.is_provisional())
            .map(|m| &m.id)
    }

    /// Newest message, if any
    pub fn newest(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    /// Fold a copy into the entry with the same id, or append it.
    ///
    /// Callers must [`ScopeList::sort`] afterwards.
    pub(crate) fn upsert(&mut self, message: Message) -> Upsert {
        match self.position(&message.id) {
            Some(idx) if self.messages[idx].absorb(&message) => Upsert::Updated,
            Some(_) => Upsert::Unchanged,
            None => {
                self.messages.push(message);
                Upsert::Inserted
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &MessageId) -> Option<Message> {
        self.position(id).map(|idx| self.messages.remove(idx))
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&Message) -> bool) {
        self.messages.retain(keep);
    }

    pub(crate) fn take_all(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    /// Restore the ordering invariant
    pub(crate) fn sort(&mut self) {
        self.messages.sort_by(Message::chronological_cmp);
    }
}
