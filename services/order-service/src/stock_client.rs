//! Synchronous stock check against the stock service.
//!
//! `POST {base}/Products/validate` with `{productId, quantity}`. A 2xx answer
//! means the stock is there. Anything else (a 4xx verdict, a 5xx, a timeout,
//! a refused connection, an open breaker) means it is not: the client fails
//! closed and never surfaces the error to the caller.
//!
//! Resilience, innermost first:
//!
//! - per-attempt timeout on the `reqwest` client
//! - retry with exponential backoff on transient faults (transport errors,
//!   5xx, 408, 429)
//! - a circuit breaker counting calls whose retries were exhausted
//!
//! A definite 4xx verdict (400 insufficient, 404 unknown product) is a
//! healthy answer: it is neither retried nor counted against the breaker.

use crate::config::StockClientConfig;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use stockflow_core::ProductId;
use stockflow_runtime::{CircuitBreaker, CircuitBreakerError, RetryPolicy, retry_with_predicate};
use thiserror::Error;

/// Answers whether a quantity of a product can be ordered.
pub trait StockValidator: Send + Sync {
    /// `true` only when the stock service positively confirmed the stock.
    fn validate_stock(
        &self,
        product_id: ProductId,
        quantity: i32,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateStockRequest {
    product_id: ProductId,
    quantity: i32,
}

/// Failure of one validation attempt.
#[derive(Error, Debug)]
pub enum StockCallError {
    /// Request never got an HTTP answer (connect, timeout, body)
    #[error("Stock service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Stock service answered with a retryable status
    #[error("Stock service returned {0}")]
    Status(StatusCode),
}

impl StockCallError {
    /// Transport errors and 5xx/408/429 answers may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(status) => is_transient_status(*status),
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// HTTP [`StockValidator`] with timeout, retry and circuit breaker.
#[derive(Debug, Clone)]
pub struct HttpStockValidationClient {
    client: Client,
    validate_url: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl HttpStockValidationClient {
    /// Build a client from its settings.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the HTTP client cannot be built.
    pub fn new(config: &StockClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            validate_url: format!("{}/Products/validate", config.base_url.trim_end_matches('/')),
            retry: config.retry_policy(),
            breaker: CircuitBreaker::new("stock-service", config.breaker_config()),
        })
    }

    /// The breaker guarding calls, for inspection.
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// One attempt. `Ok` carries a definite verdict; `Err` is a fault.
    async fn attempt(&self, request: &ValidateStockRequest) -> Result<bool, StockCallError> {
        let response = self
            .client
            .post(&self.validate_url)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if is_transient_status(status) {
            return Err(StockCallError::Status(status));
        }
        tracing::info!(
            product_id = %request.product_id,
            quantity = request.quantity,
            status = status.as_u16(),
            "Stock validation refused"
        );
        Ok(false)
    }

    async fn validate(&self, product_id: ProductId, quantity: i32) -> bool {
        let request = ValidateStockRequest {
            product_id,
            quantity,
        };

        let outcome = self
            .breaker
            .call(|| {
                retry_with_predicate(
                    self.retry.clone(),
                    || self.attempt(&request),
                    StockCallError::is_transient,
                )
            })
            .await;

        match outcome {
            Ok(verdict) => verdict,
            Err(CircuitBreakerError::Open) => {
                tracing::warn!(%product_id, quantity, "Stock service circuit open, failing closed");
                false
            }
            Err(CircuitBreakerError::Inner(error)) => {
                tracing::warn!(
                    %product_id,
                    quantity,
                    %error,
                    "Stock validation failed, failing closed"
                );
                false
            }
        }
    }
}

impl StockValidator for HttpStockValidationClient {
    fn validate_stock(
        &self,
        product_id: ProductId,
        quantity: i32,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(self.validate(product_id, quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert!(StockCallError::Status(status).is_transient(), "{status}");
        }
    }

    #[test]
    fn verdicts_are_not_transient() {
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }
}
