//! # Driven Ports (SPI - Outbound)
//!
//! Interfaces this crate depends on. The host peer provides:
//! - World state access (get/put/delete by key)
//! - Partial composite key and rich (selector) queries with pagination
//! - Per-key change history
//! - The caller's serialized credential
//!
//! Ordering, consensus and transaction isolation are the host's concern.
//! Nothing in this crate adds locking on top of these calls.

use crate::domain::query::QueryMetadata;
use crate::errors::LedgerError;
use async_trait::async_trait;

// =============================================================================
// CREDENTIAL
// =============================================================================

/// Opaque caller credential as delivered by the host.
///
/// Cryptographic verification already happened upstream; this crate only
/// reads the certificate bytes and the issuing organization.
pub trait Credential: Send + Sync {
    /// PEM-encoded certificate bytes.
    fn raw_bytes(&self) -> &[u8];

    /// Organization (MSP) identifier of the credential issuer.
    fn org(&self) -> &str;
}

/// Plain credential value: certificate bytes plus MSP id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedIdentity {
    /// MSP identifier.
    pub mspid: String,
    /// PEM certificate bytes.
    pub id_bytes: Vec<u8>,
}

impl SerializedIdentity {
    /// Create a new credential.
    pub fn new(mspid: impl Into<String>, id_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            mspid: mspid.into(),
            id_bytes: id_bytes.into(),
        }
    }
}

impl Credential for SerializedIdentity {
    fn raw_bytes(&self) -> &[u8] {
        &self.id_bytes
    }

    fn org(&self) -> &str {
        &self.mspid
    }
}

// =============================================================================
// RESULT ITERATORS
// =============================================================================

/// One element yielded by a result iterator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    /// World state key (or composite key) of the entry.
    pub key: String,
    /// Stored value bytes. Empty for history deletion markers.
    pub value: Vec<u8>,
    /// Transaction that produced this value (history iterators only).
    pub tx_id: Option<String>,
}

impl LedgerEntry {
    /// Create a world state entry.
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
            tx_id: None,
        }
    }
}

/// Server-side cursor over query results.
///
/// Every iterator must be closed exactly once, whether or not it was
/// fully consumed. Each advance may suspend while the host fetches data.
#[async_trait]
pub trait StateIterator: Send {
    /// Advance the cursor. `Ok(None)` means the iterator is exhausted.
    async fn next(&mut self) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Release the cursor.
    async fn close(&mut self) -> Result<(), LedgerError>;
}

/// A page of query results: the cursor plus the page's metadata.
pub struct PagedIterator {
    /// Result cursor.
    pub iterator: Box<dyn StateIterator>,
    /// Pagination metadata for the page.
    pub metadata: QueryMetadata,
}

// =============================================================================
// CHAINCODE STUB (host world state)
// =============================================================================

/// Host world state and transaction facilities for one invocation.
#[async_trait]
pub trait ChaincodeStub: Send + Sync {
    /// Read the value stored under `key`. `None` when absent.
    async fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Write `value` under `key`.
    async fn put_state(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError>;

    /// Delete `key`.
    async fn delete_state(&self, key: &str) -> Result<(), LedgerError>;

    /// Prefix range scan over composite keys in the `object_type` namespace.
    async fn get_state_by_partial_composite_key_with_pagination(
        &self,
        object_type: &str,
        attributes: &[String],
        page_size: u32,
        bookmark: &str,
    ) -> Result<PagedIterator, LedgerError>;

    /// Rich query against the secondary index.
    async fn get_query_result_with_pagination(
        &self,
        query: &str,
        page_size: u32,
        bookmark: &str,
    ) -> Result<PagedIterator, LedgerError>;

    /// Full, unpaginated change history of `key`, oldest first.
    async fn get_history_for_key(&self, key: &str)
        -> Result<Box<dyn StateIterator>, LedgerError>;

    /// Credential of the invoking client.
    fn creator(&self) -> &dyn Credential;
}

// =============================================================================
// TESTS
// =============================================================================
