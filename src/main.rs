use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use dispatch_service::{
    api::{AppState, run_api_server},
    clients::{
        circuit_breaker::{CircuitBreaker, IDENTITY_SERVICE},
        database::DatabaseClient,
        health::HealthChecker,
        identity::IdentityClient,
        rbmq::RabbitMqPublisher,
        token::TokenCache,
    },
    config::Config,
    context::{
        ContextChains, ResolverSet, default_layout, profile::UserProfileResolver,
        static_values::StaticResolver,
    },
    dispatch::Dispatcher,
    events::EventService,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    info!(page_size = config.page_size, "Configuration loaded");

    let database = DatabaseClient::connect(&config.database_url).await?;
    let publisher = Arc::new(RabbitMqPublisher::connect(&config).await?);

    let redis = redis::Client::open(config.redis_url.as_str())
        .map_err(|e| anyhow!("Failed to create redis client: {}", e))?
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;
    let identity_breaker =
        CircuitBreaker::new(IDENTITY_SERVICE, redis.clone(), config.circuit_breaker_config());

    let identity = Arc::new(
        IdentityClient::new(config.identity_settings(), Arc::new(TokenCache::new()))?
            .with_circuit_breaker(identity_breaker.clone()),
    );

    let resolvers = ResolverSet {
        user_profile: Some(UserProfileResolver::new(identity.clone())),
        static_values: Some(StaticResolver::new(config.static_context()?)),
    };
    let chains = ContextChains::build(&default_layout(), &resolvers)?;

    let store = Arc::new(database.clone());
    let dispatcher = Dispatcher::new(
        store.clone(),
        store,
        identity,
        publisher.clone(),
        chains,
        config.page_size,
        config.notifications_email_from.clone(),
    );

    let state = Arc::new(AppState {
        dispatcher,
        publisher: publisher.clone(),
        events: EventService::new(config.verify_url.clone()),
        health_checker: HealthChecker::new(database, publisher, redis, identity_breaker),
    });

    run_api_server(config.server_port, state)
        .await
        .map_err(|e| anyhow!("API server failed: {}", e))?;

    Ok(())
}
