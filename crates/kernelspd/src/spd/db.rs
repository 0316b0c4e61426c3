//! IP selector database.
//!
//! Per policy set, entries are kept sorted by priority (highest first),
//! then precedence (highest first), then insertion order. The database
//! does no locking of its own; [`Spd`](super::Spd) wraps it in the SPD
//! lock.

use bytes::Bytes;

use super::command::{SpdAction, SpdId};
use super::error::{Error, Result};
use super::selector::{self, Flow, SelectorGroup};

/// A validated selector entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorEntry {
    id: u32,
    spd_id: SpdId,
    action: SpdAction,
    priority: u32,
    precedence: u32,
    selectors: SelectorGroup,
    payload: Bytes,
}

impl SelectorEntry {
    /// Copy and check a selector payload into a new entry.
    ///
    /// The copy is allocated fallibly. Nothing is retained on failure.
    pub fn new(id: u32, action: SpdAction, priority: u32, payload: &[u8]) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(payload.len())
            .map_err(|_| Error::ResourceExhausted(payload.len()))?;
        buf.extend_from_slice(payload);

        let selectors = selector::entry_check(&buf)?;

        Ok(Self {
            id,
            spd_id: SpdId::In,
            action,
            priority,
            precedence: 0,
            selectors,
            payload: Bytes::from(buf),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Policy set the entry was added to.
    pub fn spd_id(&self) -> SpdId {
        self.spd_id
    }

    pub fn action(&self) -> SpdAction {
        self.action
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn precedence(&self) -> u32 {
        self.precedence
    }

    pub fn selectors(&self) -> &SelectorGroup {
        &self.selectors
    }

    /// Raw selector payload as received.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Check if the flow matches any selector of the entry.
    pub fn matches(&self, flow: &Flow) -> bool {
        self.selectors.matches(flow)
    }

    fn sort_key(&self) -> (u32, u32) {
        (self.priority, self.precedence)
    }
}

/// Ordered selector entries for every policy set.
#[derive(Debug, Default)]
pub struct IpSelectorDb {
    sets: [Vec<SelectorEntry>; SpdId::COUNT],
}

impl IpSelectorDb {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry into a policy set.
    ///
    /// An entry already present under the same id is replaced and
    /// returned, so ids stay unique within the set.
    pub fn entry_add(
        &mut self,
        spd_id: SpdId,
        mut entry: SelectorEntry,
        precedence: u32,
    ) -> Option<SelectorEntry> {
        entry.spd_id = spd_id;
        entry.precedence = precedence;

        let replaced = self.entry_remove(spd_id, entry.id);

        let set = &mut self.sets[spd_id.index()];
        let key = entry.sort_key();
        let pos = set.partition_point(|e| e.sort_key() >= key);
        set.insert(pos, entry);

        replaced
    }

    /// Remove an entry by id.
    pub fn entry_remove(&mut self, spd_id: SpdId, entry_id: u32) -> Option<SelectorEntry> {
        let set = &mut self.sets[spd_id.index()];
        let pos = set.iter().position(|e| e.id == entry_id)?;
        Some(set.remove(pos))
    }

    /// Remove any remaining entry, or `None` once every set is empty.
    pub fn entry_remove_next(&mut self) -> Option<SelectorEntry> {
        self.sets.iter_mut().find_map(|set| set.pop())
    }

    /// Get an entry by id.
    pub fn get(&self, spd_id: SpdId, entry_id: u32) -> Option<&SelectorEntry> {
        self.sets[spd_id.index()].iter().find(|e| e.id == entry_id)
    }

    /// Iterate a policy set in traversal order.
    pub fn iter(&self, spd_id: SpdId) -> impl Iterator<Item = &SelectorEntry> {
        self.sets[spd_id.index()].iter()
    }

    /// First entry in traversal order whose selectors match the flow.
    pub fn lookup(&self, spd_id: SpdId, flow: &Flow) -> Option<&SelectorEntry> {
        self.iter(spd_id).find(|e| e.matches(flow))
    }

    /// Number of entries in one policy set.
    pub fn len(&self, spd_id: SpdId) -> usize {
        self.sets[spd_id.index()].len()
    }

    /// Number of entries across all sets.
    pub fn total_len(&self) -> usize {
        self.sets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(Vec::is_empty)
    }
}

/// Owned view of an entry for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub spd_id: SpdId,
    pub id: u32,
    pub action: SpdAction,
    pub priority: u32,
    pub precedence: u32,
    pub selectors: SelectorGroup,
    /// Selector payload, sharing the entry's buffer.
    pub payload: Bytes,
}

impl From<&SelectorEntry> for EntrySummary {
    fn from(entry: &SelectorEntry) -> Self {
        Self {
            spd_id: entry.spd_id(),
            id: entry.id(),
            action: entry.action(),
            priority: entry.priority(),
            precedence: entry.precedence(),
            selectors: entry.selectors().clone(),
            payload: entry.payload().clone(),
        }
    }
}
