//! Message store - the merged view of history pages and live events
//!
//! Every mutation keeps each scope's list duplicate-free and sorted by
//! `(created_at, id)`, so the result of a merge never depends on which
//! source delivered a message first.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use chat_core::{Message, MessageId, ScopeKey};

use super::scope_list::{ScopeList, Upsert};
use super::tombstones::Tombstones;

/// How a batch of messages enters a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// An older history page
    PrependHistory,
    /// Live arrivals (or a gap-filling page after reconnect)
    AppendLive,
    /// The first page of a freshly opened scope
    ReplaceInitial,
}

/// Outcome counters of a merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    /// Held entries a copy changed
    pub replaced: usize,
    /// Copies no newer than the held entry
    pub duplicates: usize,
    /// Earlier entries dropped by `ReplaceInitial`
    pub dropped: usize,
    /// Dropped because the id is tombstoned
    pub skipped: usize,
}

impl MergeReport {
    /// Whether the scope's list changed
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.replaced > 0 || self.dropped > 0
    }
}

/// Per-scope message lists keyed by `K`
#[derive(Debug)]
pub struct MessageStore<K = ScopeKey> {
    scopes: HashMap<K, ScopeList>,
    tombstones: Tombstones,
}

impl<K> MessageStore<K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Create an empty store remembering up to `tombstone_capacity` deleted ids
    pub fn new(tombstone_capacity: usize) -> Self {
        Self {
            scopes: HashMap::new(),
            tombstones: Tombstones::new(tombstone_capacity),
        }
    }

    /// Ensure an (empty) list exists for `scope`; returns `true` if created
    pub fn open(&mut self, scope: K) -> bool {
        if self.scopes.contains_key(&scope) {
            return false;
        }
        self.scopes.insert(scope, ScopeList::new());
        true
    }

    pub fn contains_scope(&self, scope: &K) -> bool {
        self.scopes.contains_key(scope)
    }

    pub fn scope(&self, scope: &K) -> Option<&ScopeList> {
        self.scopes.get(scope)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &K> {
        self.scopes.keys()
    }

    /// Messages of a scope (empty if the scope is unknown)
    pub fn messages(&self, scope: &K) -> &[Message] {
        match self.scopes.get(scope) {
            Some(list) => list.messages(),
            None => &[],
        }
    }

    /// Merge a batch into a scope, creating the scope if needed.
    ///
    /// A copy of an id already present is folded into the held entry with
    /// [`Message::absorb`] (later edit wins, reactions kept), and tombstoned
    /// ids are skipped whatever the mode. `ReplaceInitial` additionally drops
    /// earlier entries the batch does not contain, except provisional ones
    /// and those newer than the batch's newest message.
    pub fn merge(&mut self, scope: &K, messages: Vec<Message>, mode: InsertMode) -> MergeReport {
        let mut report = MergeReport::default();
        let incoming: Vec<Message> = messages
            .into_iter()
            .filter(|m| {
                let dead = self.tombstones.contains(&m.id);
                if dead {
                    report.skipped += 1;
                }
                !dead
            })
            .collect();

        let list = self.scopes.entry(scope.clone()).or_default();

        if mode == InsertMode::ReplaceInitial {
            let newest = incoming.iter().max_by(|a, b| a.chronological_cmp(b)).cloned();
            if let Some(newest) = newest {
                let paged: HashSet<&MessageId> = incoming.iter().map(|m| &m.id).collect();
                let before = list.len();
                list.retain(|m| {
                    m.is_provisional()
                        || paged.contains(&m.id)
                        || m.chronological_cmp(&newest).is_gt()
                });
                report.dropped = before - list.len();
            }
        }

        for message in incoming {
            match list.upsert(message) {
                Upsert::Inserted => report.inserted += 1,
                Upsert::Updated => report.replaced += 1,
                Upsert::Unchanged => report.duplicates += 1,
            }
        }
        list.sort();

        tracing::debug!(
            scope = ?scope,
            ?mode,
            inserted = report.inserted,
            replaced = report.replaced,
            duplicates = report.duplicates,
            dropped = report.dropped,
            skipped = report.skipped,
            "Merged messages"
        );
        report
    }

    /// Delete a message from one scope and tombstone its id
    pub fn remove(&mut self, scope: &K, id: &MessageId) -> Option<Message> {
        self.tombstones.insert(id.clone());
        self.scopes.get_mut(scope).and_then(|list| list.remove(id))
    }

    /// Delete a message from every scope and tombstone its id
    pub fn remove_everywhere(&mut self, id: &MessageId) -> Vec<(K, Message)> {
        self.tombstones.insert(id.clone());
        self.scopes
            .iter_mut()
            .filter_map(|(scope, list)| list.remove(id).map(|m| (scope.clone(), m)))
            .collect()
    }

    /// Drop an entry without tombstoning it (a provisional send that failed)
    pub fn take(&mut self, id: &MessageId) -> Vec<K> {
        self.scopes
            .iter_mut()
            .filter_map(|(scope, list)| list.remove(id).map(|_| scope.clone()))
            .collect()
    }

    /// Put back entries removed by a delete that the server rejected
    pub fn restore(&mut self, entries: Vec<(K, Message)>) -> Vec<K> {
        let mut touched = Vec::new();
        for (scope, message) in entries {
            self.tombstones.lift(&message.id);
            if let Some(list) = self.scopes.get_mut(&scope) {
                list.upsert(message);
                list.sort();
                touched.push(scope);
            }
        }
        touched
    }

    #[inline]
    pub fn is_tombstoned(&self, id: &MessageId) -> bool {
        self.tombstones.contains(id)
    }

    /// Drop a scope's list and pagination state
    pub fn discard(&mut self, scope: &K) -> bool {
        self.scopes.remove(scope).is_some()
    }

    /// Mutate every copy of a message; returns the scopes where `f` reported a change
    pub fn update<F>(&mut self, id: &MessageId, mut f: F) -> Vec<K>
    where
        F: FnMut(&mut Message) -> bool,
    {
        let mut changed = Vec::new();
        for (scope, list) in &mut self.scopes {
            if let Some(message) = list.get_mut(id) {
                if f(message) {
                    changed.push(scope.clone());
                }
            }
        }
        for scope in &changed {
            if let Some(list) = self.scopes.get_mut(scope) {
                list.sort();
            }
        }
        changed
    }

    /// Scopes currently holding a message
    pub fn locate(&self, id: &MessageId) -> Vec<K> {
        self.scopes
            .iter()
            .filter(|(_, list)| list.contains(id))
            .map(|(scope, _)| scope.clone())
            .collect()
    }

    /// Any copy of a message
    pub fn find(&self, id: &MessageId) -> Option<&Message> {
        self.scopes.values().find_map(|list| list.get(id))
    }

    /// Swap an optimistic entry for the server's copy.
    ///
    /// Returns the scopes that changed. If the confirmed id is tombstoned the
    /// provisional entry is simply dropped.
    pub fn replace_provisional(&mut self, provisional: &MessageId, confirmed: &Message) -> Vec<K> {
        let dead = self.tombstones.contains(&confirmed.id);
        let mut changed = Vec::new();
        for (scope, list) in &mut self.scopes {
            if list.remove(provisional).is_none() {
                continue;
            }
            if !dead {
                list.upsert(confirmed.clone());
                list.sort();
            }
            changed.push(scope.clone());
        }
        changed
    }

    pub fn has_more(&self, scope: &K) -> bool {
        self.scopes.get(scope).is_some_and(ScopeList::has_more)
    }

    pub fn set_has_more(&mut self, scope: &K, has_more: bool) {
        if let Some(list) = self.scopes.get_mut(scope) {
            list.set_has_more(has_more);
        }
    }

    pub fn is_loaded(&self, scope: &K) -> bool {
        self.scopes.get(scope).is_some_and(ScopeList::is_loaded)
    }

    pub fn mark_loaded(&mut self, scope: &K) {
        if let Some(list) = self.scopes.get_mut(scope) {
            list.mark_loaded();
        }
    }

    /// Oldest confirmed message id of a scope
    pub fn cursor(&self, scope: &K) -> Option<&MessageId> {
        self.scopes.get(scope).and_then(ScopeList::cursor)
    }

    /// Ids present in more than one position of any list (always empty)
    #[cfg(test)]
    fn duplicate_ids(&self) -> std::collections::HashSet<MessageId> {
        let mut dupes = std::collections::HashSet::new();
        for list in self.scopes.values() {
            let mut seen = std::collections::HashSet::new();
            for m in list.messages() {
                if !seen.insert(m.id.clone()) {
                    dupes.insert(m.id.clone());
                }
            }
        }
        dupes
    }
}

impl<K> Default for MessageStore<K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new(1024)
    }
}
