//! Order service binary.
//!
//! Connects to the broker (fatal after the backoff schedule is exhausted),
//! consumes the stock service's answers and serves the order HTTP API until
//! Ctrl+C or SIGTERM.

use order_service::{
    AppState, Config, HttpStockValidationClient, InMemoryOrderStore, OrderService,
    StockInsufficientHandler, StockReservedHandler, order_router,
};
use std::sync::Arc;
use stockflow_amqp::{AmqpConnection, AmqpEventBus};
use stockflow_core::environment::{Clock, SystemClock};
use stockflow_core::{EventBus, StockInsufficient, StockReserved};
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
                .unwrap_or_else(|_| "order_service=info,stockflow=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting order service");

    let config = Config::from_env()?;
    info!(
        amqp_url = %config.broker.url,
        stock_service_url = %config.stock.base_url,
        address = %config.bind_address(),
        "Configuration loaded"
    );

    let connection = Arc::new(
        AmqpConnection::connect_with_policy(&config.broker.url, &config.broker.connect_policy())
            .await
            .inspect_err(|error| tracing::error!(%error, "Giving up on broker connection"))?,
    );
    let bus: Arc<dyn EventBus> =
        Arc::new(AmqpEventBus::new(Arc::clone(&connection), "order-service"));

    let orders = Arc::new(InMemoryOrderStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stock = Arc::new(HttpStockValidationClient::new(&config.stock)?);
    let service = Arc::new(OrderService::new(
        orders.clone(),
        stock,
        EventPublisher::new(Arc::clone(&bus)),
        Arc::clone(&clock),
    ));

    let mut subscriber = EventSubscriber::new(Arc::clone(&bus), config.broker.redelivery_policy());
    subscriber
        .register::<StockInsufficient, _, _>(move || {
            StockInsufficientHandler::new(orders.clone(), Arc::clone(&clock))
        })?
        .register::<StockReserved, _, _>(|| StockReservedHandler)?;
    subscriber.start().await?;
    info!("Stock outcome consumers started");

    let app = order_router(AppState::new(service));
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
