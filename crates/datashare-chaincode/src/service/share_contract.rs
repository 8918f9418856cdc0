//! # Data Share Contract
//!
//! Orchestrates the consent workflow. Record-level rules live on the
//! DataShare record itself; this layer adds the checks that need the
//! stored record:
//!
//! - `cancel` is allowed only for the stored proposer
//! - `approve` and `reject` are allowed only for the stored approver
//! - `request` never reopens a consent that is already decided
//!
//! Both re-derive the caller at call time and compare against the fetched
//! record, never against the payload.
//!
//! Generic record mutations are disabled; consent records are created by
//! `request`/`share` and removed by `cancel`.

use crate::config::ChaincodeConfig;
use crate::domain::consent::ConsentEvent;
use crate::domain::fields::{
    escape_nul, is_truthy, lint_param, text_of, APPROVER_IDENTITY, CHAIN_KEY, PROPOSER_IDENTITY,
    STATE_TYPE, TARGET_KEY,
};
use crate::domain::identity::CallerIdentity;
use crate::domain::query::{bookmark_param, page_size_param, PagedStates, RichQuery};
use crate::domain::record::StateRecord;
use crate::domain::variant::{RecordKind, DATA_SHARE_STATE_TYPE};
use crate::errors::{ChaincodeError, ChaincodeResult};
use crate::ports::inbound::{DataShareApi, DataStateApi, UploadAndShare};
use crate::service::context::TxContext;
use crate::service::repository::StateRepository;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// Index hints for consent listings.
pub const DATA_SHARE_INDEX: [&str; 2] = ["indexDataShareDoc", "indexDataShare"];

/// Consent workflow operations over DataShare records, plus the Data
/// records they grant access to.
#[derive(Debug, Clone)]
pub struct DataShareContract {
    grants: StateRepository,
    datas: StateRepository,
}

impl Default for DataShareContract {
    fn default() -> Self {
        Self::new()
    }
}

impl DataShareContract {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&ChaincodeConfig::default())
    }

    #[must_use]
    pub fn with_config(config: &ChaincodeConfig) -> Self {
        Self {
            grants: StateRepository::with_config(RecordKind::DataShare, config),
            datas: StateRepository::with_config(RecordKind::Data, config),
        }
    }

    /// Persist consent records: one goes through `create`, several through
    /// `create_many`.
    async fn persist(
        &self,
        ctx: &TxContext,
        mut records: Vec<StateRecord>,
        overwrite: bool,
    ) -> ChaincodeResult<Vec<StateRecord>> {
        if records.len() == 1 {
            let record = records.remove(0);
            Ok(vec![self.grants.create(ctx, record, overwrite).await?])
        } else {
            self.grants.create_many(ctx, records, overwrite).await
        }
    }

    /// Materialize a share payload and run `share()` on each consent.
    fn shared(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<Vec<StateRecord>> {
        let caller = ctx.caller()?;
        let mut records = self
            .grants
            .materialize_many(ctx, escape_nul(payload))?;
        for record in &mut records {
            record.share(&caller)?;
            let key = record.chain_key()?;
            info!(
                key = %key,
                approver = %caller.id,
                proposer = record.proposer_identity().unwrap_or_default(),
                "access shared"
            );
        }
        Ok(records)
    }

    async fn upload_and_share_with(
        &self,
        ctx: &TxContext,
        data_list: &str,
        grant_list: &str,
        overwrite: bool,
    ) -> ChaincodeResult<UploadAndShare> {
        let datas = self.datas.create_many(ctx, data_list, overwrite).await?;
        let grants = self.shared(ctx, grant_list)?;
        let grants = self.grants.create_many(ctx, grants, overwrite).await?;
        Ok(UploadAndShare { datas, grants })
    }

    /// A request may replace a pending consent but never a decided one.
    async fn ensure_requestable(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<()> {
        match ctx.stub().get_state(key).await? {
            Some(bytes) if !bytes.is_empty() => {
                let existing = self.grants.decode(&bytes)?;
                if let Err(err) = existing.consent_status()?.on(ConsentEvent::Request) {
                    warn!(key, error = %err, "consent already decided");
                    return Err(err);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Write a decided consent back under the key it was loaded from.
    async fn store_decision(
        &self,
        ctx: &TxContext,
        key: &str,
        decided: StateRecord,
    ) -> ChaincodeResult<StateRecord> {
        let derived = decided.chain_key()?;
        if derived != key {
            warn!(key, derived = %derived, "decision would move the consent");
            return Err(ChaincodeError::Mismatch(format!(
                "State[{key}] would be stored as {derived}"
            )));
        }
        self.grants.update(ctx, decided, false, false).await
    }

    /// Stored value of the record a consent targets.
    async fn load_target(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<Option<Value>> {
        if key.is_empty() {
            return Ok(None);
        }
        match ctx.stub().get_state(key).await? {
            Some(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ChaincodeError::Serialization(format!("target {key}: {e}"))),
            _ => Ok(None),
        }
    }

    async fn list_consents(
        &self,
        ctx: &TxContext,
        selector: Map<String, Value>,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates> {
        let query = json!({ "selector": selector, "use_index": DATA_SHARE_INDEX });
        self.grants
            .list_by_query(
                ctx,
                &RichQuery::from_document(&query, page_size_param(page_size), bookmark_param(bookmark)),
            )
            .await
    }
}

fn consent_selector() -> Map<String, Value> {
    let mut selector = Map::new();
    selector.insert(STATE_TYPE.to_string(), Value::from(DATA_SHARE_STATE_TYPE));
    selector
}

fn ensure_approver(stored: &StateRecord, caller: &CallerIdentity) -> ChaincodeResult<()> {
    let approver = stored.approver_identity().unwrap_or_default();
    if approver != caller.id {
        warn!(caller = %caller.id, approver, "caller is not the approver");
        return Err(ChaincodeError::Authorization(format!(
            "Caller[{}] is not Approver[{approver}]",
            caller.id
        )));
    }
    Ok(())
}

fn ensure_proposer(stored: &StateRecord, caller: &CallerIdentity) -> ChaincodeResult<()> {
    let proposer = stored.proposer_identity().unwrap_or_default();
    if proposer != caller.id {
        warn!(caller = %caller.id, proposer, "caller is not the proposer");
        return Err(ChaincodeError::Authorization(format!(
            "Caller[{}] is not Proposer[{proposer}]",
            caller.id
        )));
    }
    Ok(())
}

fn unsupported(operation: &str, instead: &str) -> ChaincodeError {
    ChaincodeError::Unsupported(format!("DataShare does not support {operation}, use {instead}"))
}

#[async_trait]
impl DataShareApi for DataShareContract {
    #[instrument(skip_all)]
    async fn request(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<Vec<StateRecord>> {
        let caller = ctx.caller()?;
        let mut records = self
            .grants
            .materialize_many(ctx, escape_nul(payload))?;
        for record in &mut records {
            let target_key = record.share_fields()?.target_key.clone();
            let target = self.load_target(ctx, &target_key).await?;
            record.request(&caller, target.as_ref())?;
            self.ensure_requestable(ctx, &record.chain_key()?).await?;
            info!(proposer = %caller.id, target = %target_key, "access requested");
        }
        self.persist(ctx, records, true).await
    }

    #[instrument(skip_all)]
    async fn share(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<Vec<StateRecord>> {
        let records = self.shared(ctx, payload)?;
        self.persist(ctx, records, true).await
    }

    #[instrument(skip_all)]
    async fn upload_and_share(
        &self,
        ctx: &TxContext,
        data_list: &str,
        grant_list: &str,
    ) -> ChaincodeResult<UploadAndShare> {
        self.upload_and_share_with(ctx, data_list, grant_list, true)
            .await
    }

    #[instrument(skip_all)]
    async fn upload_and_share_no_overwrite(
        &self,
        ctx: &TxContext,
        data_list: &str,
        grant_list: &str,
    ) -> ChaincodeResult<UploadAndShare> {
        self.upload_and_share_with(ctx, data_list, grant_list, false)
            .await
    }

    #[instrument(skip(self, ctx))]
    async fn cancel(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<String> {
        let stored = self.grants.fetch_by_key(ctx, key).await?;
        let caller = ctx.caller()?;
        ensure_proposer(&stored, &caller)?;
        let key = self.grants.delete_by_key(ctx, key, true).await?;
        info!(key = %key, proposer = %caller.id, "consent cancelled");
        Ok(key)
    }

    #[instrument(skip(self, ctx, update))]
    async fn approve(
        &self,
        ctx: &TxContext,
        key: &str,
        update: &str,
    ) -> ChaincodeResult<StateRecord> {
        let update = self.grants.materialize_one(ctx, update)?;
        let mut stored = self.grants.fetch_by_key(ctx, key).await?;
        let caller = ctx.caller()?;
        ensure_approver(&stored, &caller)?;
        stored.approve(&update)?;
        info!(key, approver = %caller.id, "consent approved");
        self.store_decision(ctx, key, stored).await
    }

    #[instrument(skip(self, ctx))]
    async fn reject(
        &self,
        ctx: &TxContext,
        key: &str,
        handled_time: &str,
    ) -> ChaincodeResult<StateRecord> {
        let mut stored = self.grants.fetch_by_key(ctx, key).await?;
        let caller = ctx.caller()?;
        ensure_approver(&stored, &caller)?;
        stored.reject(handled_time)?;
        info!(key, approver = %caller.id, "consent rejected");
        self.store_decision(ctx, key, stored).await
    }

    #[instrument(skip(self, ctx))]
    async fn list_by_state_type(
        &self,
        ctx: &TxContext,
        filter: &str,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates> {
        let filter: Value = serde_json::from_str(&escape_nul(filter))
            .map_err(|e| ChaincodeError::Validation(format!("filter is not JSON: {e}")))?;
        let mut selector = consent_selector();
        for field in [PROPOSER_IDENTITY, APPROVER_IDENTITY, TARGET_KEY] {
            let value = match filter.get(field) {
                Some(Value::String(raw)) => lint_param(raw),
                Some(other) => other.clone(),
                None => continue,
            };
            if is_truthy(&value) {
                selector.insert(field.to_string(), value);
            }
        }
        self.list_consents(ctx, selector, page_size, bookmark).await
    }

    #[instrument(skip(self, ctx))]
    async fn list_for_approver(
        &self,
        ctx: &TxContext,
        approver: &str,
        target_key: &str,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates> {
        let mut selector = consent_selector();
        selector.insert(TARGET_KEY.to_string(), Value::from(target_key));
        selector.insert(APPROVER_IDENTITY.to_string(), Value::from(approver));
        self.list_consents(ctx, selector, page_size, bookmark).await
    }

    #[instrument(skip(self, ctx))]
    async fn list_for_proposer(
        &self,
        ctx: &TxContext,
        proposer: &str,
        target_data_type: &str,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates> {
        let mut selector = consent_selector();
        if !target_data_type.is_empty() {
            selector.insert("targetDataType".to_string(), Value::from(target_data_type));
        }
        selector.insert(PROPOSER_IDENTITY.to_string(), Value::from(proposer));
        let mut page = self
            .list_consents(ctx, selector, page_size, bookmark)
            .await?;

        let mut target_keys: Vec<String> = Vec::new();
        for key in page
            .items
            .iter()
            .filter_map(|item| item.get(TARGET_KEY).and_then(text_of))
        {
            if !target_keys.contains(&key) {
                target_keys.push(key);
            }
        }
        if target_keys.is_empty() {
            return Ok(page);
        }

        let page_size = u32::try_from(target_keys.len()).unwrap_or(u32::MAX);
        let query = json!({ "selector": { "chainKey": { "$in": target_keys } } });
        let targets = self
            .datas
            .list_by_query(ctx, &RichQuery::from_document(&query, Some(page_size), None))
            .await?;
        let by_key: HashMap<String, Value> = targets
            .items
            .into_iter()
            .filter_map(|item| Some((item.get(CHAIN_KEY).and_then(text_of)?, item)))
            .collect();

        for item in &mut page.items {
            let found = item
                .get(TARGET_KEY)
                .and_then(text_of)
                .and_then(|key| by_key.get(&key).cloned());
            if let (Some(data), Some(object)) = (found, item.as_object_mut()) {
                object.insert("data".to_string(), data);
            }
        }
        Ok(page)
    }
}

#[async_trait]
impl DataStateApi for DataShareContract {
    async fn get_by_key(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<StateRecord> {
        self.grants.fetch_by_key(ctx, key).await
    }

    async fn add_one(&self, _ctx: &TxContext, _payload: &str) -> ChaincodeResult<StateRecord> {
        Err(unsupported("addOne", "request or share"))
    }

    async fn add_many(&self, _ctx: &TxContext, _payload: &str) -> ChaincodeResult<Vec<StateRecord>> {
        Err(unsupported("addMany", "request or share"))
    }

    async fn update_one(&self, _ctx: &TxContext, _payload: &str) -> ChaincodeResult<StateRecord> {
        Err(unsupported("updateOne", "approve or reject"))
    }

    async fn update_many(
        &self,
        _ctx: &TxContext,
        _payload: &str,
    ) -> ChaincodeResult<Vec<StateRecord>> {
        Err(unsupported("updateMany", "approve or reject"))
    }

    async fn update_fields(
        &self,
        _ctx: &TxContext,
        _key: &str,
        _fields: &str,
        _values: &str,
    ) -> ChaincodeResult<StateRecord> {
        Err(unsupported("updateFields", "approve or reject"))
    }

    async fn delete_one(&self, _ctx: &TxContext, _key: &str) -> ChaincodeResult<String> {
        Err(unsupported("deleteOne", "cancel"))
    }

    async fn delete_many(&self, _ctx: &TxContext, _keys: &str) -> ChaincodeResult<Vec<String>> {
        Err(unsupported("deleteMany", "cancel"))
    }

    async fn list_by_composite_key(
        &self,
        _ctx: &TxContext,
        _key_object: &str,
        _page_size: &str,
        _bookmark: &str,
    ) -> ChaincodeResult<PagedStates> {
        Err(unsupported("listByCompositeKey", "listByStateType"))
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
        self.grants.list_by_query(ctx, &query).await
    }

    async fn list_history(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<PagedStates> {
        self.grants.history_for_key(ctx, key).await
    }

    async fn get_by_business_id(
        &self,
        _ctx: &TxContext,
        _business_id: &str,
    ) -> ChaincodeResult<StateRecord> {
        Err(unsupported("getByBusinessId", "listByStateType"))
    }
}

// =============================================================================
// TESTS
// =============================================================================
