//! # Iterator Draining
//!
//! Every result cursor is consumed eagerly into a list and closed exactly
//! once, whether draining finished or failed part way.

use crate::errors::{ChaincodeError, ChaincodeResult};
use crate::ports::outbound::StateIterator;
use serde_json::Value;
use tracing::{debug, warn};

/// Drain `iterator` into parsed JSON documents, in encounter order.
///
/// Entries with an empty value (history deletion markers) are skipped.
///
/// # Errors
///
/// - `Ledger` when advancing or closing fails
/// - `Serialization` when a value is not JSON
///
/// An advance or parse failure takes precedence over a close failure.
pub async fn drain_iterator(mut iterator: Box<dyn StateIterator>) -> ChaincodeResult<Vec<Value>> {
    let drained = collect(iterator.as_mut()).await;
    let closed = iterator.close().await;
    let items = drained?;
    if let Err(err) = closed {
        warn!(error = %err, "failed to close result iterator");
        return Err(err.into());
    }
    debug!(count = items.len(), "iterator drained");
    Ok(items)
}

async fn collect(iterator: &mut dyn StateIterator) -> ChaincodeResult<Vec<Value>> {
    let mut items = Vec::new();
    while let Some(entry) = iterator.next().await? {
        if entry.value.is_empty() {
            continue;
        }
        let item = serde_json::from_slice(&entry.value).map_err(|e| {
            ChaincodeError::Serialization(format!("value under {}: {e}", entry.key))
        })?;
        items.push(item);
    }
    Ok(items)
}
