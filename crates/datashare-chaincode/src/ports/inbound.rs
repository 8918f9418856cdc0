//! # Driving Ports (API - Inbound)
//!
//! The operation surface exposed to the host's dispatch layer. Arguments
//! arrive as the raw strings the host forwards; results are typed and
//! serialize to the JSON the host returns to clients.
//!
//! Every operation takes the transaction context first and re-derives the
//! caller's identity from it when authorization is involved.

use crate::domain::query::PagedStates;
use crate::domain::record::StateRecord;
use crate::errors::ChaincodeResult;
use crate::service::context::TxContext;
use async_trait::async_trait;
use serde::Serialize;

/// Result of an upload-and-share call.
#[derive(Clone, Debug, Serialize)]
pub struct UploadAndShare {
    /// Data records written.
    pub datas: Vec<StateRecord>,
    /// Consent records written, already approved.
    pub grants: Vec<StateRecord>,
}

/// Generic record operations.
#[async_trait]
pub trait DataStateApi: Send + Sync {
    /// Load the record stored under `key`.
    async fn get_by_key(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<StateRecord>;

    /// Create (or overwrite) one record from a JSON object.
    async fn add_one(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<StateRecord>;

    /// Create records from a JSON array (or a single object).
    async fn add_many(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<Vec<StateRecord>>;

    /// Replace an existing record. Caller must own it.
    async fn update_one(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<StateRecord>;

    /// Replace several existing records, each authorized independently.
    async fn update_many(
        &self,
        ctx: &TxContext,
        payload: &str,
    ) -> ChaincodeResult<Vec<StateRecord>>;

    /// Overwrite top-level fields of a stored record.
    ///
    /// `fields` and `values` are JSON arrays of equal length once falsy
    /// field names are dropped.
    async fn update_fields(
        &self,
        ctx: &TxContext,
        key: &str,
        fields: &str,
        values: &str,
    ) -> ChaincodeResult<StateRecord>;

    /// Delete one record. Returns its key.
    async fn delete_one(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<String>;

    /// Delete every key of a JSON array. Not atomic across the batch.
    async fn delete_many(&self, ctx: &TxContext, keys: &str) -> ChaincodeResult<Vec<String>>;

    /// Prefix scan: `key_object` is `{"objectType": .., "objectKeys": [..]}`.
    async fn list_by_composite_key(
        &self,
        ctx: &TxContext,
        key_object: &str,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates>;

    /// Rich selector query.
    async fn list_by_query(
        &self,
        ctx: &TxContext,
        query: &str,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates>;

    /// Full change history of `key`.
    async fn list_history(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<PagedStates>;

    /// First record whose `businessId` matches.
    async fn get_by_business_id(
        &self,
        ctx: &TxContext,
        business_id: &str,
    ) -> ChaincodeResult<StateRecord>;
}

/// Consent workflow operations.
#[async_trait]
pub trait DataShareApi: Send + Sync {
    /// Proposer asks for access. Payload is one consent or an array.
    async fn request(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<Vec<StateRecord>>;

    /// Approver grants access directly. Payload is one consent or an array.
    async fn share(&self, ctx: &TxContext, payload: &str) -> ChaincodeResult<Vec<StateRecord>>;

    /// Write Data records and grant access to them in one invocation,
    /// overwriting existing records.
    async fn upload_and_share(
        &self,
        ctx: &TxContext,
        data_list: &str,
        grant_list: &str,
    ) -> ChaincodeResult<UploadAndShare>;

    /// As [`Self::upload_and_share`], keeping records that already exist.
    async fn upload_and_share_no_overwrite(
        &self,
        ctx: &TxContext,
        data_list: &str,
        grant_list: &str,
    ) -> ChaincodeResult<UploadAndShare>;

    /// Proposer withdraws a consent record. Returns its key.
    async fn cancel(&self, ctx: &TxContext, key: &str) -> ChaincodeResult<String>;

    /// Approver grants a pending request.
    async fn approve(
        &self,
        ctx: &TxContext,
        key: &str,
        update: &str,
    ) -> ChaincodeResult<StateRecord>;

    /// Approver refuses a pending request.
    async fn reject(
        &self,
        ctx: &TxContext,
        key: &str,
        handled_time: &str,
    ) -> ChaincodeResult<StateRecord>;

    /// Consent records filtered by optional proposer, approver and target.
    async fn list_by_state_type(
        &self,
        ctx: &TxContext,
        filter: &str,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates>;

    /// Consent records an approver holds for one target.
    async fn list_for_approver(
        &self,
        ctx: &TxContext,
        approver: &str,
        target_key: &str,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates>;

    /// Consent records of a proposer, each with its target Data record
    /// attached under `data`.
    async fn list_for_proposer(
        &self,
        ctx: &TxContext,
        proposer: &str,
        target_data_type: &str,
        page_size: &str,
        bookmark: &str,
    ) -> ChaincodeResult<PagedStates>;
}
