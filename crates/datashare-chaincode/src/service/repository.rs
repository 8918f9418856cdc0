//! # State Repository
//!
//! Generic CRUD and query facade over the host world state, bound to one
//! record variant. Every operation takes the transaction context first.
//!
//! ## Authorization
//!
//! Mutations authorize against the record as currently STORED, never the
//! incoming payload:
//!
//! | Operation | Org check | Member check |
//! |-----------|-----------|--------------|
//! | `update` | `org_only` | `member_only` |
//! | `patch_fields` | always | `member_only` |
//! | `delete_by_key` | always | `member_only` |
//!
//! A bound repository also refuses to mutate a stored record of another
//! variant (`InvalidState`).
//!
//! ## Batches
//!
//! `create_many`, `update_many` and `delete_by_keys` run their items
//! concurrently and wait for all of them. The first failure in input order
//! is returned; writes that already happened are not compensated (the host
//! discards the transaction on error).

use crate::config::ChaincodeConfig;
use crate::domain::fields::{escape_nul, lint_keys, lint_param, DEFAULT_IMMUTABLE_FIELDS};
use crate::domain::identity::CallerIdentity;
use crate::domain::query::{effective_page_size, CompositeKeyQuery, PagedStates, RichQuery};
use crate::domain::record::StateRecord;
use crate::domain::variant::{RecordKind, StateRegistry};
use crate::errors::{ChaincodeError, ChaincodeResult};
use crate::service::context::TxContext;
use crate::service::iterator::drain_iterator;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Index hints for business-id lookups.
pub const BASE_INDEX: [&str; 2] = ["indexBaseDoc", "indexBase"];

// =============================================================================
// INPUT
// =============================================================================

/// Raw record input accepted by the materializers.
#[derive(Clone, Debug)]
pub enum StateInput {
    /// An already-built record, used as is.
    Record(StateRecord),
    /// Already-built records, used as is.
    Records(Vec<StateRecord>),
    /// A JSON object or a JSON array of objects.
    Json(String),
}

impl From<StateRecord> for StateInput {
    fn from(record: StateRecord) -> Self {
        Self::Record(record)
    }
}

impl From<Vec<StateRecord>> for StateInput {
    fn from(records: Vec<StateRecord>) -> Self {
        Self::Records(records)
    }
}

impl From<String> for StateInput {
    fn from(raw: String) -> Self {
        Self::Json(raw)
    }
}

impl From<&str> for StateInput {
    fn from(raw: &str) -> Self {
        Self::Json(raw.to_string())
    }
}

// =============================================================================
// REPOSITORY
// =============================================================================

/// CRUD and query operations for one record variant.
#[derive(Debug, Clone)]
pub struct StateRepository {
    kind: Option<RecordKind>,
    registry: StateRegistry,
    immutable_fields: &'static [&'static str],
    default_page_size: u32,
}

impl StateRepository {
    /// Repository for `kind` with default settings.
    #[must_use]
    pub fn new(kind: RecordKind) -> Self {
        Self::with_config(kind, &ChaincodeConfig::default())
    }

    /// Repository for `kind`.
    #[must_use]
    pub fn with_config(kind: RecordKind, config: &ChaincodeConfig) -> Self {
        Self {
            kind: Some(kind),
            ..Self::unbound(config)
        }
    }

    /// Repository without a bound variant. It can decode, read, delete and
    /// list, but refuses to materialize input.
    #[must_use]
    pub fn unbound(config: &ChaincodeConfig) -> Self {
        Self {
            kind: None,
            registry: StateRegistry::default(),
            immutable_fields: DEFAULT_IMMUTABLE_FIELDS,
            default_page_size: config.default_page_size,
        }
    }

    /// Bound variant, if any.
    #[must_use]
    pub fn kind(&self) -> Option<RecordKind> {
        self.kind
    }

    /// Tag registry used by [`Self::decode`].
    pub fn registry_mut(&mut self) -> &mut StateRegistry {
        &mut self.registry
    }

    fn bound_kind(&self) -> ChaincodeResult<RecordKind> {
        self.kind.ok_or_else(|| {
            ChaincodeError::Configuration("repository has no bound record variant".to_string())
        })
    }

    /// A bound repository only mutates records of its own variant.
    fn ensure_bound_kind(&self, stored: &StateRecord, key: &str) -> ChaincodeResult<()> {
        match self.kind {
            Some(kind) if stored.kind() != kind => {
                warn!(key, bound = %kind, stored = %stored.kind(), "record variant mismatch");
                Err(ChaincodeError::InvalidState {
                    expected: format!("{kind} record"),
                    actual: format!("{} record", stored.kind()),
                })
            }
            _ => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Materialization & decoding
    // -------------------------------------------------------------------------

    /// Build one record of the bound variant.
    ///
    /// # Errors
    ///
    /// - `Configuration` without a bound variant
    /// - `Validation` when the input is not exactly one JSON object
    /// - construction errors from [`StateRecord::materialize`]
    pub fn materialize_one(
        &self,
        ctx: &TxContext,
        input: impl Into<StateInput>,
    ) -> ChaincodeResult<StateRecord> {
        let kind = self.bound_kind()?;
        match input.into() {
            StateInput::Record(record) => Ok(record),
            StateInput::Records(mut records) if records.len() == 1 => Ok(records.remove(0)),
            StateInput::Records(records) => Err(ChaincodeError::Validation(format!(
                "expected one record, got {}",
                records.len()
            ))),
            StateInput::Json(raw) => match parse_json(&raw)? {
                Value::Object(map) => self.build(&ctx.caller()?, kind, map),
                other => Err(ChaincodeError::Validation(format!(
                    "expected a JSON object, got {}",
                    json_type(&other)
                ))),
            },
        }
    }

    /// Build records of the bound variant. A single JSON object yields one.
    ///
    /// # Errors
    ///
    /// As [`Self::materialize_one`], for the first failing element.
    pub fn materialize_many(
        &self,
        ctx: &TxContext,
        input: impl Into<StateInput>,
    ) -> ChaincodeResult<Vec<StateRecord>> {
        let kind = self.bound_kind()?;
        match input.into() {
            StateInput::Record(record) => Ok(vec![record]),
            StateInput::Records(records) => Ok(records),
            StateInput::Json(raw) => {
                let items = match parse_json(&raw)? {
                    Value::Array(items) => items,
                    single => vec![single],
                };
                let caller = ctx.caller()?;
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) => self.build(&caller, kind, map),
                        other => Err(ChaincodeError::Validation(format!(
                            "expected a JSON object, got {}",
                            json_type(&other)
                        ))),
                    })
                    .collect()
            }
        }
    }

    fn build(
        &self,
        caller: &CallerIdentity,
        kind: RecordKind,
        map: Map<String, Value>,
    ) -> ChaincodeResult<StateRecord> {
        StateRecord::materialize(caller, kind, map, self.immutable_fields)
    }

    /// Rebuild a record from persisted bytes, choosing the variant by the
    /// document's `stateType` tag.
    ///
    /// # Errors
    ///
    /// `Serialization` when the bytes are not a JSON object.
    pub fn decode(&self, bytes: &[u8]) -> ChaincodeResult<StateRecord> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ChaincodeError::Serialization(e.to_string()))?;
        self.decode_value(value)
    }

    /// As [`Self::decode`], from an already-parsed document.
    ///
    /// # Errors
    ///
    /// `Serialization` when `value` is not a JSON object.
    pub fn decode_value(&self, value: Value) -> ChaincodeResult<StateRecord> {
        let Value::Object(doc) = value else {
            return Err(ChaincodeError::Serialization(format!(
                "persisted state is a JSON {}, not an object",
                json_type(&value)
            )));
        };
        let kind = self.registry.resolve_document(&doc);
        StateRecord::restore(kind, doc)
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Persist one record under its chain key.
    ///
    /// With `overwrite == false` an existing record is returned unchanged
    /// and nothing is written.
    ///
    /// # Errors
    ///
    /// Materialization, chain-key and ledger errors.
    pub async fn create(
        &self,
        ctx: &TxContext,
        input: impl Into<StateInput>,
        overwrite: bool,
    ) -> ChaincodeResult<StateRecord> {
        let record = self.materialize_one(ctx, input)?;
        self.persist_new(ctx, record, overwrite).await
    }

    /// Persist several records concurrently. Result order matches input.
    ///
    /// # Errors
    ///
    /// The first failure in input order.
    pub async fn create_many(
        &self,
        ctx: &TxContext,
        input: impl Into<StateInput>,
        overwrite: bool,
    ) -> ChaincodeResult<Vec<StateRecord>> {
        let records = self.materialize_many(ctx, input)?;
        debug!(count = records.len(), overwrite, "create_many");
        join_all(
            records
                .into_iter()
                .map(|record| self.persist_new(ctx, record, overwrite)),
        )
        .await
        .into_iter()
        .collect()
    }

    async fn persist_new(
        &self,
        ctx: &TxContext,
        record: StateRecord,
        overwrite: bool,
    ) -> ChaincodeResult<StateRecord> {
        let key = record.chain_key()?;
        if !overwrite {
            if let Some(existing) = ctx.stub().get_state(&key).await? {
                debug!(key = %key, "record exists, keeping stored version");
                return self.decode(&existing);
            }
        }
        debug!(key = %key, kind = %record.kind(), "put record");
        ctx.stub().put_state(&key, record.to_bytes()?).await?;
        Ok(record)
    }

    // -------------------------------------------------------------------------
    // Read
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// `NotFound` when nothing is stored under `key`.
    pub async fn fetch_by_key(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<StateRecord> {
        debug!(key, "fetch_by_key");
        match ctx.stub().get_state(key).await? {
            Some(bytes) if !bytes.is_empty() => self.decode(&bytes),
            _ => Err(ChaincodeError::NotFound(key.to_string())),
        }
    }

    /// First record whose `businessId` equals `business_id` (parsed as a
    /// JSON literal when possible).
    ///
    /// # Errors
    ///
    /// `NotFound` when no record matches.
    pub async fn fetch_by_business_id(
        &self,
        ctx: &TxContext,
        business_id: &str,
    ) -> ChaincodeResult<StateRecord> {
        let query = json!({
            "selector": { "businessId": lint_param(business_id) },
            "use_index": BASE_INDEX,
        });
        let page = self
            .list_by_query(ctx, &RichQuery::from_document(&query, Some(1), None))
            .await?;
        let first = page.items.into_iter().next().ok_or_else(|| {
            ChaincodeError::NotFound(format!("State with {business_id}"))
        })?;
        self.decode_value(first)
    }

    // -------------------------------------------------------------------------
    // Update
    // -------------------------------------------------------------------------

    /// Replace the stored record at the input's chain key.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no record exists at that key
    /// - `Authorization` per the flags, checked against the stored record
    pub async fn update(
        &self,
        ctx: &TxContext,
        input: impl Into<StateInput>,
        member_only: bool,
        org_only: bool,
    ) -> ChaincodeResult<StateRecord> {
        let record = self.materialize_one(ctx, input)?;
        let caller = ctx.caller()?;
        self.replace(ctx, &caller, record, member_only, org_only)
            .await
    }

    /// Replace several records, each authorized on its own (org check on).
    ///
    /// # Errors
    ///
    /// The first failure in input order.
    pub async fn update_many(
        &self,
        ctx: &TxContext,
        input: impl Into<StateInput>,
        member_only: bool,
    ) -> ChaincodeResult<Vec<StateRecord>> {
        let records = self.materialize_many(ctx, input)?;
        let caller = ctx.caller()?;
        join_all(
            records
                .into_iter()
                .map(|record| self.replace(ctx, &caller, record, member_only, true)),
        )
        .await
        .into_iter()
        .collect()
    }

    async fn replace(
        &self,
        ctx: &TxContext,
        caller: &CallerIdentity,
        record: StateRecord,
        member_only: bool,
        org_only: bool,
    ) -> ChaincodeResult<StateRecord> {
        let key = record.chain_key()?;
        let stored = match ctx.stub().get_state(&key).await? {
            Some(bytes) if !bytes.is_empty() => self.decode(&bytes)?,
            _ => return Err(ChaincodeError::NotFound(format!("Update Target[{key}]"))),
        };
        authorize(&stored, caller, org_only, member_only, &key)?;
        self.ensure_bound_kind(&stored, &key)?;
        debug!(key = %key, "replace record");
        ctx.stub().put_state(&key, record.to_bytes()?).await?;
        Ok(record)
    }

    /// Overwrite top-level fields of the record stored under `key`.
    ///
    /// Field names are used literally; no nested-path interpretation.
    ///
    /// # Errors
    ///
    /// - `Arity` when the lists differ in length
    /// - `NotFound`, `Authorization` as for updates (org check always on)
    pub async fn patch_fields(
        &self,
        ctx: &TxContext,
        key: &str,
        names: &[String],
        values: Vec<Value>,
        member_only: bool,
    ) -> ChaincodeResult<StateRecord> {
        if names.len() != values.len() {
            return Err(ChaincodeError::Arity {
                fields: names.len(),
                values: values.len(),
            });
        }
        let mut record = self.fetch_by_key(ctx, key).await?;
        let caller = ctx.caller()?;
        authorize(&record, &caller, true, member_only, key)?;
        self.ensure_bound_kind(&record, key)?;
        for (name, value) in names.iter().zip(values) {
            record.apply_field(name, value)?;
        }
        debug!(key, fields = ?names, "patch record");
        ctx.stub().put_state(key, record.to_bytes()?).await?;
        Ok(record)
    }

    // -------------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------------

    /// Delete the record under `key` and return the key.
    ///
    /// # Errors
    ///
    /// `NotFound`, then `Authorization` (org check always on).
    pub async fn delete_by_key(
        &self,
        ctx: &TxContext,
        key: &str,
        member_only: bool,
    ) -> ChaincodeResult<String> {
        let stored = self.fetch_by_key(ctx, key).await?;
        let caller = ctx.caller()?;
        authorize(&stored, &caller, true, member_only, key)?;
        self.ensure_bound_kind(&stored, key)?;
        debug!(key, "delete record");
        ctx.stub().delete_state(key).await?;
        Ok(key.to_string())
    }

    /// Delete every key of a JSON array, independently.
    ///
    /// # Errors
    ///
    /// - `Validation` unless `keys` is a JSON array of strings
    /// - the first per-key failure in input order
    pub async fn delete_by_keys(
        &self,
        ctx: &TxContext,
        keys: &str,
        member_only: bool,
    ) -> ChaincodeResult<Vec<String>> {
        let keys = match parse_json(keys)? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(key) => Ok(key),
                    other => Err(ChaincodeError::Validation(format!(
                        "chain key must be a string, got {other}"
                    ))),
                })
                .collect::<ChaincodeResult<Vec<String>>>()?,
            _ => {
                return Err(ChaincodeError::Validation(
                    "No valid chain key array".to_string(),
                ))
            }
        };
        join_all(
            keys.iter()
                .map(|key| self.delete_by_key(ctx, key, member_only)),
        )
        .await
        .into_iter()
        .collect()
    }

    // -------------------------------------------------------------------------
    // Listings
    // -------------------------------------------------------------------------

    /// Prefix scan over a composite key namespace.
    ///
    /// # Errors
    ///
    /// `Validation` unless both `object_type` and `object_keys` are given.
    pub async fn list_by_composite_key(
        &self,
        ctx: &TxContext,
        query: &CompositeKeyQuery,
    ) -> ChaincodeResult<PagedStates> {
        let (Some(object_type), Some(object_keys)) = (
            query.object_type.as_deref().filter(|t| !t.is_empty()),
            query.object_keys.as_deref(),
        ) else {
            return Err(ChaincodeError::Validation(
                "objectType & objectKeys is necessary".to_string(),
            ));
        };
        let attributes = lint_keys(object_keys);
        let page_size = effective_page_size(query.page_size, self.default_page_size);
        let bookmark = query.bookmark.as_deref().unwrap_or_default();
        debug!(object_type, ?attributes, page_size, bookmark, "list_by_composite_key");

        let page = ctx
            .stub()
            .get_state_by_partial_composite_key_with_pagination(
                object_type,
                &attributes,
                page_size,
                bookmark,
            )
            .await?;
        let items = drain_iterator(page.iterator).await?;
        Ok(PagedStates::new(items, Some(page.metadata)))
    }

    /// Rich selector query. Literal NUL characters in the query text are
    /// escaped before it is parsed and forwarded.
    ///
    /// # Errors
    ///
    /// `Validation` when the query is not JSON or lacks a `selector`.
    pub async fn list_by_query(
        &self,
        ctx: &TxContext,
        query: &RichQuery,
    ) -> ChaincodeResult<PagedStates> {
        let escaped = escape_nul(&query.query_string);
        let parsed: Value = serde_json::from_str(&escaped).map_err(|e| {
            ChaincodeError::Validation(format!("Query string must be JSON: {e}"))
        })?;
        if parsed.get("selector").is_none() {
            return Err(ChaincodeError::Validation(
                "Query string must contain selector field".to_string(),
            ));
        }
        let page_size = effective_page_size(query.page_size, self.default_page_size);
        let bookmark = query.bookmark.as_deref().unwrap_or_default();
        debug!(query = %escaped, page_size, bookmark, "list_by_query");

        let page = ctx
            .stub()
            .get_query_result_with_pagination(&escaped, page_size, bookmark)
            .await?;
        let items = drain_iterator(page.iterator).await?;
        Ok(PagedStates::new(items, Some(page.metadata)))
    }

    /// Every persisted version of `key`, oldest first. Deletions are skipped.
    ///
    /// # Errors
    ///
    /// Ledger and decoding errors.
    pub async fn history_for_key(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<PagedStates> {
        debug!(key, "history_for_key");
        let iterator = ctx.stub().get_history_for_key(key).await?;
        let items = drain_iterator(iterator).await?;
        Ok(PagedStates::new(items, None))
    }
}

/// Check the stored record against the caller. Org first, then member.
fn authorize(
    stored: &StateRecord,
    caller: &CallerIdentity,
    org_only: bool,
    member_only: bool,
    key: &str,
) -> ChaincodeResult<()> {
    let mut verdict = Ok(());
    if org_only {
        verdict = stored.is_submit_by_caller_org(caller);
    }
    if verdict.is_ok() && member_only {
        verdict = stored.is_submit_by_caller(caller);
    }
    if let Err(err) = &verdict {
        warn!(key, caller = %caller.id, mspid = %caller.mspid, error = %err, "mutation denied");
    }
    verdict
}

fn parse_json(raw: &str) -> ChaincodeResult<Value> {
    serde_json::from_str(raw).map_err(|e| ChaincodeError::Validation(format!("invalid JSON: {e}")))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// TESTS
// =============================================================================
