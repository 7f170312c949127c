//! Broker connection manager.
//!
//! A process opens exactly one [`AmqpConnection`] at startup and shares it
//! as `Arc<AmqpConnection>`; every publish and subscription opens its own
//! channel on top of it.

use lapin::{Channel, Connection, ConnectionProperties};
use std::fmt::Display;
use std::future::Future;
use stockflow_core::EventBusError;
use stockflow_runtime::RetryPolicy;

/// Five attempts, waiting 1s, 2s, 4s, 8s, 16s before each.
pub const DEFAULT_CONNECT_POLICY: RetryPolicy = RetryPolicy::builder()
    .max_retries(4)
    .initial_delay(std::time::Duration::from_secs(1))
    .max_delay(std::time::Duration::from_secs(16))
    .multiplier(2.0)
    .build();

/// Run `connect` up to `policy.max_attempts()` times, sleeping
/// `policy.delay_for_attempt(i)` before attempt `i` (the first attempt
/// included).
///
/// # Errors
///
/// Returns [`EventBusError::ConnectionFailed`] carrying the last error once
/// every attempt has failed.
pub async fn connect_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut connect: F,
) -> Result<T, EventBusError>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts();
    let mut last_error = String::from("no connection attempt was made");

    for attempt in 0..max_attempts {
        tokio::time::sleep(policy.delay_for_attempt(attempt)).await;

        match connect().await {
            Ok(connection) => {
                tracing::info!(attempt = attempt + 1, "Connected to message broker");
                return Ok(connection);
            }
            Err(error) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    %error,
                    "Broker connection attempt failed"
                );
                last_error = error.to_string();
            }
        }
    }

    tracing::error!(max_attempts, error = %last_error, "Could not connect to message broker");
    Err(EventBusError::ConnectionFailed(format!(
        "gave up after {max_attempts} attempts: {last_error}"
    )))
}

/// The process-wide broker connection.
pub struct AmqpConnection {
    connection: Connection,
}

impl std::fmt::Debug for AmqpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpConnection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl AmqpConnection {
    /// Connect to `uri` with [`DEFAULT_CONNECT_POLICY`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if every attempt fails.
    /// The caller is expected to treat this as fatal.
    pub async fn connect(uri: &str) -> Result<Self, EventBusError> {
        Self::connect_with_policy(uri, &DEFAULT_CONNECT_POLICY).await
    }

    /// Connect to `uri`, retrying per `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if every attempt fails.
    pub async fn connect_with_policy(
        uri: &str,
        policy: &RetryPolicy,
    ) -> Result<Self, EventBusError> {
        tracing::info!(max_attempts = policy.max_attempts(), "Connecting to message broker");
        let connection = connect_with_backoff(policy, || {
            Connection::connect(uri, ConnectionProperties::default())
        })
        .await?;
        Ok(Self { connection })
    }

    /// Open a new channel.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::TransportError`] if the broker refuses.
    pub async fn create_channel(&self) -> Result<Channel, EventBusError> {
        self.connection
            .create_channel()
            .await
            .map_err(|e| EventBusError::TransportError(e.to_string()))
    }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::TransportError`] if the close handshake fails.
    pub async fn close(&self) -> Result<(), EventBusError> {
        self.connection
            .close(200, "OK")
            .await
            .map_err(|e| EventBusError::TransportError(e.to_string()))
    }
}
