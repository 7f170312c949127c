//! Stock service binary.
//!
//! Connects to the broker (fatal after the backoff schedule is exhausted),
//! consumes `OrderCreated` and serves the stock HTTP API until Ctrl+C or
//! SIGTERM.

use std::sync::Arc;
use stock_service::{AppState, Config, InMemoryProductStore, OrderCreatedHandler, stock_router};
use stockflow_amqp::{AmqpConnection, AmqpEventBus};
use stockflow_core::{EventBus, OrderCreated};
use stockflow_core::environment::{Clock, SystemClock};
use stockflow_runtime::{EventPublisher, EventSubscriber};
use stockflow_web::shutdown_signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stock_service=info,stockflow=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting stock service");

    let config = Config::from_env()?;
    info!(
        amqp_url = %config.broker.url,
        address = %config.bind_address(),
        max_delivery_retries = config.broker.max_delivery_retries,
        "Configuration loaded"
    );

    let connection = Arc::new(
        AmqpConnection::connect_with_policy(&config.broker.url, &config.broker.connect_policy())
            .await
            .inspect_err(|error| tracing::error!(%error, "Giving up on broker connection"))?,
    );
    let bus: Arc<dyn EventBus> =
        Arc::new(AmqpEventBus::new(Arc::clone(&connection), "stock-service"));

    let products = Arc::new(InMemoryProductStore::new());
    let publisher = EventPublisher::new(Arc::clone(&bus));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut subscriber = EventSubscriber::new(Arc::clone(&bus), config.broker.redelivery_policy());
    {
        let products = Arc::clone(&products);
        subscriber.register::<OrderCreated, _, _>(move || {
            OrderCreatedHandler::new(products.clone(), publisher.clone(), Arc::clone(&clock))
        })?;
    }
    subscriber.start().await?;
    info!("OrderCreated consumer started");

    let app = stock_router(AppState::new(products));
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!(address = %config.bind_address(), "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(error) = subscriber.shutdown().await {
        tracing::warn!(%error, "Failed to stop event subscriber");
    }
    if let Err(error) = connection.close().await {
        tracing::warn!(%error, "Failed to close broker connection");
    }

    info!("Server stopped");
    Ok(())
}
