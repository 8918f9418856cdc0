//! # In-Memory Ledger
//!
//! World state held in process memory, implementing [`ChaincodeStub`].
//! Supports what the repository needs from a peer: point reads and writes,
//! partial composite key scans, selector queries (equality and `$in`) with
//! bookmark pagination, and per-key history.
//!
//! The ledger also counts writes and iterator closes so callers can check
//! idempotency and cursor cleanup.

use crate::domain::query::QueryMetadata;
use crate::errors::LedgerError;
use crate::ports::outbound::{
    ChaincodeStub, Credential, LedgerEntry, PagedIterator, SerializedIdentity, StateIterator,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

/// Delimiter between composite key segments.
pub const COMPOSITE_KEY_DELIMITER: char = '\u{0}';

/// Build a composite key: `\0objectType\0attr1\0attr2\0`.
#[must_use]
pub fn composite_key(object_type: &str, attributes: &[String]) -> String {
    let mut key = String::new();
    key.push(COMPOSITE_KEY_DELIMITER);
    key.push_str(object_type);
    key.push(COMPOSITE_KEY_DELIMITER);
    for attribute in attributes {
        key.push_str(attribute);
        key.push(COMPOSITE_KEY_DELIMITER);
    }
    key
}

// =============================================================================
// LEDGER
// =============================================================================

/// Shared world state. One ledger may back many stubs (one per caller).
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    world: RwLock<BTreeMap<String, Vec<u8>>>,
    history: RwLock<HashMap<String, Vec<LedgerEntry>>>,
    queries: Mutex<Vec<String>>,
    writes: AtomicUsize,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    fail_after: Mutex<Option<usize>>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value without counting it as a write.
    pub fn seed(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.world.write().insert(key.into(), value.into());
    }

    /// Current value under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.world.read().get(key).cloned()
    }

    /// Current value under `key`, parsed as JSON.
    #[must_use]
    pub fn get_json(&self, key: &str) -> Option<Value> {
        self.get(key)
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }

    /// Number of keys in the world state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.world.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.world.read().is_empty()
    }

    /// Puts and deletes performed through a stub.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Iterators handed out.
    #[must_use]
    pub fn opened_iterators(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// `close()` calls received across all iterators.
    #[must_use]
    pub fn closed_iterators(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Rich query strings received, in order.
    #[must_use]
    pub fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Make every iterator created from now on fail after yielding `n`
    /// entries.
    pub fn fail_iterators_after(&self, n: usize) {
        *self.fail_after.lock() = Some(n);
    }

    fn put(&self, key: &str, value: Vec<u8>) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.record_history(key, value.clone());
        self.world.write().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.record_history(key, Vec::new());
        self.world.write().remove(key);
    }

    fn record_history(&self, key: &str, value: Vec<u8>) {
        let entry = LedgerEntry {
            key: key.to_string(),
            value,
            tx_id: Some(Uuid::new_v4().to_string()),
        };
        self.history
            .write()
            .entry(key.to_string())
            .or_default()
            .push(entry);
    }

    fn iterator(&self, entries: Vec<LedgerEntry>) -> Box<dyn StateIterator> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Box::new(MemoryIterator {
            entries: entries.into(),
            yielded: 0,
            fail_after: *self.fail_after.lock(),
            closed: Arc::clone(&self.closed),
        })
    }

    /// One page of `candidates` (already key-ordered) after `bookmark`.
    fn page(
        &self,
        candidates: Vec<LedgerEntry>,
        page_size: u32,
        bookmark: &str,
    ) -> PagedIterator {
        let page: Vec<LedgerEntry> = candidates
            .into_iter()
            .filter(|entry| bookmark.is_empty() || entry.key.as_str() > bookmark)
            .take(page_size as usize)
            .collect();
        let metadata = QueryMetadata {
            fetched_records_count: u32::try_from(page.len()).unwrap_or(u32::MAX),
            bookmark: page.last().map(|e| e.key.clone()).unwrap_or_default(),
        };
        PagedIterator {
            iterator: self.iterator(page),
            metadata,
        }
    }

    fn select(&self, selector: &Map<String, Value>) -> Vec<LedgerEntry> {
        self.world
            .read()
            .iter()
            .filter_map(|(key, value)| {
                let doc: Value = serde_json::from_slice(value).ok()?;
                matches_selector(&doc, selector).then(|| LedgerEntry::new(key.clone(), value.clone()))
            })
            .collect()
    }
}

/// Selector semantics: every condition must hold. A condition is either a
/// literal (equality) or an object of operators (`$eq`, `$in`).
fn matches_selector(doc: &Value, selector: &Map<String, Value>) -> bool {
    selector.iter().all(|(field, condition)| {
        let actual = doc.get(field);
        match condition {
            Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) => {
                ops.iter().all(|(op, operand)| match op.as_str() {
                    "$eq" => actual == Some(operand),
                    "$in" => operand
                        .as_array()
                        .is_some_and(|options| actual.is_some_and(|a| options.contains(a))),
                    _ => false,
                })
            }
            literal => actual == Some(literal),
        }
    })
}

// =============================================================================
// ITERATOR
// =============================================================================

struct MemoryIterator {
    entries: VecDeque<LedgerEntry>,
    yielded: usize,
    fail_after: Option<usize>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl StateIterator for MemoryIterator {
    async fn next(&mut self) -> Result<Option<LedgerEntry>, LedgerError> {
        if self.fail_after.is_some_and(|limit| self.yielded >= limit) {
            return Err(LedgerError::Iterator("cursor lost".to_string()));
        }
        let entry = self.entries.pop_front();
        if entry.is_some() {
            self.yielded += 1;
        }
        Ok(entry)
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        Ok(())
    }
}

// =============================================================================
// STUB
// =============================================================================

/// A caller's view of an [`InMemoryLedger`].
#[derive(Debug, Clone)]
pub struct InMemoryStub {
    ledger: Arc<InMemoryLedger>,
    creator: SerializedIdentity,
}

impl InMemoryStub {
    #[must_use]
    pub fn new(ledger: Arc<InMemoryLedger>, creator: SerializedIdentity) -> Self {
        Self { ledger, creator }
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<InMemoryLedger> {
        &self.ledger
    }
}

#[async_trait]
impl ChaincodeStub for InMemoryStub {
    async fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.ledger.get(key).filter(|value| !value.is_empty()))
    }

    async fn put_state(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        if key.is_empty() {
            return Err(LedgerError::Other("key must not be empty".to_string()));
        }
        trace!(key, bytes = value.len(), "put_state");
        self.ledger.put(key, value);
        Ok(())
    }

    async fn delete_state(&self, key: &str) -> Result<(), LedgerError> {
        trace!(key, "delete_state");
        self.ledger.delete(key);
        Ok(())
    }

    async fn get_state_by_partial_composite_key_with_pagination(
        &self,
        object_type: &str,
        attributes: &[String],
        page_size: u32,
        bookmark: &str,
    ) -> Result<PagedIterator, LedgerError> {
        let prefix = composite_key(object_type, attributes);
        let candidates = self
            .ledger
            .world
            .read()
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, value)| LedgerEntry::new(key.clone(), value.clone()))
            .collect();
        Ok(self.ledger.page(candidates, page_size, bookmark))
    }

    async fn get_query_result_with_pagination(
        &self,
        query: &str,
        page_size: u32,
        bookmark: &str,
    ) -> Result<PagedIterator, LedgerError> {
        self.ledger.queries.lock().push(query.to_string());
        let parsed: Value =
            serde_json::from_str(query).map_err(|e| LedgerError::Query(e.to_string()))?;
        let selector = parsed
            .get("selector")
            .and_then(Value::as_object)
            .ok_or_else(|| LedgerError::Query("selector must be an object".to_string()))?;
        let candidates = self.ledger.select(selector);
        Ok(self.ledger.page(candidates, page_size, bookmark))
    }

    async fn get_history_for_key(
        &self,
        key: &str,
    ) -> Result<Box<dyn StateIterator>, LedgerError> {
        let entries = self
            .ledger
            .history
            .read()
            .get(key)
            .cloned()
            .unwrap_or_default();
        Ok(self.ledger.iterator(entries))
    }

    fn creator(&self) -> &dyn Credential {
        &self.creator
    }
}

// =============================================================================
// TESTS
// =============================================================================
