//! # Data State Contract
//!
//! Exposes the generic record operations for Data records. Arguments come
//! in as the raw strings the host forwards and are linted here before the
//! repository sees them.

use crate::config::ChaincodeConfig;
use crate::domain::fields::{escape_nul, text_of};
use crate::domain::query::{bookmark_param, page_size_param, CompositeKeyQuery, PagedStates, RichQuery};
use crate::domain::record::StateRecord;
use crate::domain::variant::RecordKind;
use crate::errors::{ChaincodeError, ChaincodeResult};
use crate::ports::inbound::DataStateApi;
use crate::service::context::TxContext;
use crate::service::repository::StateRepository;
use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

/// Data record operations.
#[derive(Debug, Clone)]
pub struct DataStateContract {
    repository: StateRepository,
}

impl Default for DataStateContract {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStateContract {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&ChaincodeConfig::default())
    }

    #[must_use]
    pub fn with_config(config: &ChaincodeConfig) -> Self {
        Self {
            repository: StateRepository::with_config(RecordKind::Data, config),
        }
    }

    #[must_use]
    pub fn repository(&self) -> &StateRepository {
        &self.repository
    }
}

#[async_trait]
impl DataStateApi for DataStateContract {
    #[instrument(skip(self, ctx))]
    async fn get_by_key(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<StateRecord> {
        self.repository.fetch_by_key(ctx, key).await
    }

    #[instrument(skip_all)]
    async fn add_one(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<StateRecord> {
        self.repository.create(ctx, payload, true).await
    }

    #[instrument(skip_all)]
    async fn add_many(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<Vec<StateRecord>> {
        self.repository.create_many(ctx, payload, true).await
    }

    #[instrument(skip_all)]
    async fn update_one(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<StateRecord> {
        self.repository.update(ctx, payload, true, true).await
    }

    #[instrument(skip_all)]
    async fn update_many(
        &self,
        ctx: &TxContext,
        payload: &str,
    ) -> ChaincodeResult<Vec<StateRecord>> {
        self.repository.update_many(ctx, payload, true).await
    }

    #[instrument(skip(self, ctx))]
    async fn update_fields(
        &self,
        ctx: &TxContext,
        key: &str,
        fields: &str,
        values: &str,
    ) -> ChaincodeResult<StateRecord> {
        let raw_names = parse_array(fields, "fields")?;
        let raw_values = parse_array(values, "values")?;
        if raw_names.len() != raw_values.len() {
            return Err(ChaincodeError::Arity {
                fields: raw_names.len(),
                values: raw_values.len(),
            });
        }
        // A falsy name drops its paired value with it.
        let (names, values): (Vec<String>, Vec<Value>) = raw_names
            .iter()
            .zip(raw_values)
            .filter_map(|(name, value)| text_of(name).map(|name| (name, value)))
            .unzip();
        self.repository
            .patch_fields(ctx, key, &names, values, true)
            .await
    }

    #[instrument(skip(self, ctx))]
    async fn delete_one(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<String> {
        self.repository.delete_by_key(ctx, key, true).await
    }

    #[instrument(skip(self, ctx))]
    async fn delete_many(&self, ctx: &TxContext, keys: &str) -> ChaincodeResult<Vec<String>> {
        self.repository.delete_by_keys(ctx, keys, true).await
    }

    #[instrument(skip(self, ctx))]
    async fn list_by_composite_key(
        &self,
        ctx: &TxContext,
        key_object: &str,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates> {
        let query = composite_key_query(key_object, page_size, bookmark)?;
        self.repository.list_by_composite_key(ctx, &query).await
    }

    #[instrument(skip(self, ctx))]
    async fn list_by_query(
        &self,
        ctx: &TxContext,
        query: &str,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates> {
        let query = RichQuery {
            query_string: query.to_string(),
            page_size: page_size_param(page_size),
            bookmark: bookmark_param(bookmark),
        };
        self.repository.list_by_query(ctx, &query).await
    }

    #[instrument(skip(self, ctx))]
    async fn list_history(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<PagedStates> {
        self.repository.history_for_key(ctx, key).await
    }

    #[instrument(skip(self, ctx))]
    async fn get_by_business_id(
        &self,
        ctx: &TxContext,
        business_id: &str,
    ) -> ChaincodeResult<StateRecord> {
        self.repository.fetch_by_business_id(ctx, business_id).await
    }
}

/// Parse a JSON array argument.
pub(crate) fn parse_array(raw: &str, what: &str) -> ChaincodeResult<Vec<Value>> {
    match serde_json::from_str(&escape_nul(raw)) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(ChaincodeError::Validation(format!("{what} must be a JSON array"))),
        Err(e) => Err(ChaincodeError::Validation(format!("{what} is not JSON: {e}"))),
    }
}

/// Build a composite key listing from `{"objectType": .., "objectKeys": [..]}`.
fn composite_key_query(
    key_object: &str,
    page_size: &str,
    bookmark: &str,
) -> ChaincodeResult<CompositeKeyQuery> {
    let parsed: Value = serde_json::from_str(&escape_nul(key_object))
        .map_err(|e| ChaincodeError::Validation(format!("key object is not JSON: {e}")))?;
    let object_keys = match parsed.get("objectKeys") {
        None | Some(Value::Null) => None,
        Some(Value::Array(keys)) => Some(keys.clone()),
        Some(_) => {
            return Err(ChaincodeError::Validation(
                "objectKeys Input is not Array".to_string(),
            ))
        }
    };
    Ok(CompositeKeyQuery {
        object_type: parsed.get("objectType").and_then(text_of),
        object_keys,
        page_size: page_size_param(page_size),
        bookmark: bookmark_param(bookmark),
    })
}

// =============================================================================
// TESTS
// =============================================================================
