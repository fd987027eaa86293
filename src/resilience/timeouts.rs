//! Timeout enforcement for store calls.
//!
//! # Design Decisions
//! - Every store query has a deadline; notification waits do not
//! - An elapsed deadline surfaces as `StoreError::Timeout`

use std::future::Future;
use std::time::Duration;

use crate::store::StoreError;

/// Run a store operation with a deadline.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}
