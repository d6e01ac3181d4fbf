//! Deadline Helpers
//!
//! Wraps async operations with a timeout, surfacing a structured
//! [`LoomError::Timeout`] instead of a bare elapsed error.

use std::future::Future;
use std::time::Duration;

use crate::types::{LoomError, Result};

/// Execute an async operation with a timeout
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(LoomError::timeout(operation_name, timeout)),
    }
}

/// Execute an async operation with a timeout, wrapping non-Result futures
pub async fn with_timeout_map<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(LoomError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, LoomError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, LoomError>(42)
            },
            "slow operation",
        )
        .await;
        assert!(matches!(result.unwrap_err(), LoomError::Timeout { .. }));
    }
}
