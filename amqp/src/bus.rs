//! `RabbitMQ` implementation of [`EventBus`].
//!
//! Topology: one queue per event type on the default exchange (routing key =
//! queue name). Publisher and subscriber declare the queue with the same
//! [`QueueTopology`]; the broker rejects a redeclaration with different flags.
//!
//! Channels: every publish opens a channel, publishes with confirms enabled
//! and closes it. Every subscription opens a channel that is kept until
//! [`EventBus::close`].

use crate::connection::AmqpConnection;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use stockflow_core::event_bus::{RETRY_COUNT_HEADER, SettleFuture};
use stockflow_core::{
    Delivery, DeliveryStream, EventBus, EventBusError, OutboundMessage, QueueTopology,
};
use tokio::sync::Mutex;

/// AMQP delivery mode 1: not persisted to disk.
const NON_PERSISTENT: u8 = 1;

/// Event bus over a shared [`AmqpConnection`].
pub struct AmqpEventBus {
    connection: Arc<AmqpConnection>,
    topology: QueueTopology,
    consumer_tag_prefix: String,
    consumer_seq: AtomicU64,
    channels: Mutex<Vec<Channel>>,
}

impl std::fmt::Debug for AmqpEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpEventBus")
            .field("topology", &self.topology)
            .field("consumer_tag_prefix", &self.consumer_tag_prefix)
            .finish_non_exhaustive()
    }
}

impl AmqpEventBus {
    /// Create a bus with the transient topology (non-durable, non-exclusive,
    /// not auto-deleted). `service` prefixes consumer tags.
    #[must_use]
    pub fn new(connection: Arc<AmqpConnection>, service: impl Into<String>) -> Self {
        Self::with_topology(connection, service, QueueTopology::TRANSIENT)
    }

    /// Create a bus declaring queues with `topology`.
    #[must_use]
    pub fn with_topology(
        connection: Arc<AmqpConnection>,
        service: impl Into<String>,
        topology: QueueTopology,
    ) -> Self {
        Self {
            connection,
            topology,
            consumer_tag_prefix: service.into(),
            consumer_seq: AtomicU64::new(0),
            channels: Mutex::new(Vec::new()),
        }
    }

    fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            durable: self.topology.durable,
            exclusive: self.topology.exclusive,
            auto_delete: self.topology.auto_delete,
            ..QueueDeclareOptions::default()
        }
    }

    async fn declare(&self, channel: &Channel, queue: &str) -> Result<(), lapin::Error> {
        channel
            .queue_declare(queue, self.declare_options(), FieldTable::default())
            .await
            .map(|_| ())
    }

    async fn publish_on(&self, channel: &Channel, message: &OutboundMessage) -> Result<(), String> {
        self.declare(channel, &message.queue)
            .await
            .map_err(|e| format!("queue declare: {e}"))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| format!("confirm select: {e}"))?;

        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(RETRY_COUNT_HEADER),
            AMQPValue::LongUInt(message.retry_count),
        );
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(message.content_type.as_str()))
            .with_delivery_mode(NON_PERSISTENT)
            .with_headers(headers);

        let confirmation = channel
            .basic_publish(
                "",
                &message.queue,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(|e| format!("publish: {e}"))?
            .await
            .map_err(|e| format!("confirm: {e}"))?;

        if confirmation.is_nack() {
            return Err("broker nacked the message".to_string());
        }
        Ok(())
    }

    async fn publish_message(&self, message: &OutboundMessage) -> Result<(), EventBusError> {
        let failed = |reason: String| EventBusError::PublishFailed {
            queue: message.queue.clone(),
            reason,
        };

        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let result = self.publish_on(&channel, message).await;

        if let Err(error) = channel.close(200, "OK").await {
            tracing::debug!(queue = %message.queue, %error, "Failed to close publish channel");
        }

        result.map_err(failed)?;
        tracing::debug!(
            queue = %message.queue,
            retry_count = message.retry_count,
            "Published message"
        );
        Ok(())
    }

    async fn subscribe_queue(&self, queue: &str) -> Result<DeliveryStream, EventBusError> {
        if queue.trim().is_empty() {
            return Err(EventBusError::InvalidQueue(queue.to_string()));
        }
        let failed = |reason: String| EventBusError::SubscriptionFailed {
            queue: queue.to_string(),
            reason,
        };

        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| failed(e.to_string()))?;
        self.declare(&channel, queue)
            .await
            .map_err(|e| failed(format!("queue declare: {e}")))?;

        let tag = format!(
            "{}-{queue}-{}",
            self.consumer_tag_prefix,
            self.consumer_seq.fetch_add(1, Ordering::Relaxed)
        );
        let consumer = channel
            .basic_consume(queue, &tag, BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(|e| failed(format!("consume: {e}")))?;

        self.channels.lock().await.push(channel);
        tracing::info!(queue, consumer_tag = %tag, "Consuming queue");

        let queue = queue.to_string();
        let stream = consumer.map(move |next| {
            next.map(|inner| Box::new(AmqpDelivery::new(queue.clone(), inner)) as Box<dyn Delivery>)
                .map_err(|e| EventBusError::TransportError(e.to_string()))
        });
        Ok(Box::pin(stream))
    }

    async fn close_channels(&self) -> Result<(), EventBusError> {
        let channels = std::mem::take(&mut *self.channels.lock().await);
        let mut first_error = None;
        for channel in channels {
            if let Err(error) = channel.close(200, "OK").await {
                tracing::warn!(%error, "Failed to close subscription channel");
                first_error.get_or_insert_with(|| EventBusError::TransportError(error.to_string()));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl EventBus for AmqpEventBus {
    fn publish(
        &self,
        message: &OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let message = message.clone();
        Box::pin(async move { self.publish_message(&message).await })
    }

    fn subscribe(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let queue = queue.to_string();
        Box::pin(async move { self.subscribe_queue(&queue).await })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(self.close_channels())
    }
}

/// Retry counter carried in the message headers; absent or non-numeric is 0.
fn read_retry_count(headers: Option<&FieldTable>) -> u32 {
    let key = ShortString::from(RETRY_COUNT_HEADER);
    let Some(value) = headers.and_then(|table| table.inner().get(&key)) else {
        return 0;
    };
    match value {
        AMQPValue::LongUInt(n) => *n,
        AMQPValue::LongInt(n) => u32::try_from(*n).unwrap_or(0),
        AMQPValue::LongLongInt(n) => u32::try_from(*n).unwrap_or(0),
        AMQPValue::ShortUInt(n) => u32::from(*n),
        AMQPValue::ShortInt(n) => u32::try_from(*n).unwrap_or(0),
        AMQPValue::ShortShortUInt(n) => u32::from(*n),
        _ => 0,
    }
}

struct AmqpDelivery {
    queue: String,
    retry_count: u32,
    inner: lapin::message::Delivery,
}

impl AmqpDelivery {
    fn new(queue: String, inner: lapin::message::Delivery) -> Self {
        let retry_count = read_retry_count(inner.properties.headers().as_ref());
        Self {
            queue,
            retry_count,
            inner,
        }
    }
}

impl Delivery for AmqpDelivery {
    fn queue(&self) -> &str {
        &self.queue
    }

    fn body(&self) -> &[u8] {
        &self.inner.data
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn redelivered(&self) -> bool {
        self.inner.redelivered
    }

    fn ack(self: Box<Self>) -> SettleFuture {
        Box::pin(async move {
            self.inner
                .acker
                .ack(BasicAckOptions::default())
                .await
                .map(|_| ())
                .map_err(|e| EventBusError::AcknowledgeFailed(e.to_string()))
        })
    }

    fn nack(self: Box<Self>, requeue: bool) -> SettleFuture {
        Box::pin(async move {
            self.inner
                .acker
                .nack(BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                })
                .await
                .map(|_| ())
                .map_err(|e| EventBusError::AcknowledgeFailed(e.to_string()))
        })
    }
}
