//! Server assembly - wires configuration into routers and dispatchers.
//!
//! ```text
//!   AppConfig ──► channel layers ──► BroadcastCoordinator ─┐
//!             ──► authenticator ─────────────────────────┐ │
//!             ──► chat consumer ──► ConnectionDispatcher ◄┴─┘
//!                                          │
//!   Router: /ws/chat, /asyncapi.{json,yaml}, /api/events, /health
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use secrecy::ExposeSecret;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::adapters::http::{events_router, EventsAppState};
use crate::adapters::websocket::{consumer_router, docs_router};
use crate::adapters::{AllowAnonymous, InMemoryChannelLayer, RedisChannelLayer, StaticTokenAuthenticator};
use crate::application::{
    AsyncApiDocument, BroadcastCoordinator, ChannelDescriptor, ChannelLayers, ConnectionDispatcher,
    GenerationError, SchemaGenerator, DEFAULT_LAYER_ALIAS,
};
use crate::chat::chat_consumer;
use crate::config::{
    AppConfig, AuthConfig, ChannelLayerBackend, ChannelLayerConfig, ServerConfig, ValidationError,
};
use crate::domain::foundation::Principal;
use crate::domain::protocol::RegistrationError;
use crate::ports::{Authenticator, ChannelLayer, ChannelLayerError};

/// Route path of the chat consumer.
pub const CHAT_PATH: &str = "/ws/chat";

/// Failures while assembling or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("Channel layer unavailable: {0}")]
    ChannelLayer(#[from] ChannelLayerError),

    #[error("Consumer registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Protocol document generation failed: {0}")]
    Docs(#[from] GenerationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Assembled application.
pub struct App {
    pub router: Router,
    pub coordinator: Arc<BroadcastCoordinator>,
    pub document: AsyncApiDocument,
}

/// Builds the configured channel layer backend under the default alias.
pub async fn channel_layers(config: &ChannelLayerConfig) -> Result<ChannelLayers, ChannelLayerError> {
    let layer: Arc<dyn ChannelLayer> = match config.backend {
        ChannelLayerBackend::Memory => Arc::new(InMemoryChannelLayer::new(config.inbox_capacity)),
        ChannelLayerBackend::Redis => {
            tracing::info!(prefix = %config.prefix, "Connecting to Redis channel layer");
            Arc::new(
                RedisChannelLayer::connect(
                    &config.redis.url,
                    config.prefix.clone(),
                    config.inbox_capacity,
                    config.redis.timeout(),
                )
                .await?,
            )
        }
    };
    Ok(ChannelLayers::new(layer))
}

/// Static tokens when any are configured, otherwise anonymous access.
pub fn authenticator(config: &AuthConfig) -> Result<Arc<dyn Authenticator>, ValidationError> {
    let grants = config.token_grants()?;
    if grants.is_empty() {
        if !config.allow_anonymous {
            return Err(ValidationError::MissingRequired("AUTH__TOKENS"));
        }
        return Ok(Arc::new(AllowAnonymous));
    }

    let mut auth = StaticTokenAuthenticator::new();
    for grant in grants {
        auth = auth.with_token(grant.token.expose_secret().as_str(), Principal::user(grant.user_id));
    }
    if config.allow_anonymous {
        auth = auth.allow_anonymous();
    }
    Ok(Arc::new(auth))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins_list()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }
}

/// Builds every route from `config`. Connects to Redis when configured.
pub async fn build_app(config: &AppConfig) -> Result<App, ServerError> {
    let coordinator = Arc::new(BroadcastCoordinator::new(
        channel_layers(&config.channel_layer).await?,
    ));
    let authenticator = authenticator(&config.auth)?;

    let chat = Arc::new(chat_consumer(CHAT_PATH, config.protocol.namespaces)?);
    let document = SchemaGenerator::new(config.docs.docs_info())
        .discriminator_field(config.protocol.discriminator_field.clone())
        .generate(&[chat.as_ref() as &dyn ChannelDescriptor])?;

    let dispatcher = ConnectionDispatcher::new(
        chat,
        authenticator,
        coordinator.clone(),
        config.protocol.dispatcher_config(),
    );

    let mut router = Router::new()
        .merge(consumer_router(CHAT_PATH, dispatcher))
        .merge(events_router(EventsAppState::new(
            coordinator.clone(),
            DEFAULT_LAYER_ALIAS,
        )));
    if config.docs.enabled {
        router = router.merge(docs_router(&document)?);
    }
    let router = router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server));

    Ok(App {
        router,
        coordinator,
        document,
    })
}

/// Serves `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: App, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "Switchboard listening");

    axum::serve(
        listener,
        app.router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    tracing::info!("Switchboard stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn anonymous_without_tokens() {
        assert!(authenticator(&AuthConfig::default()).is_ok());
    }

    #[test]
    fn closed_server_requires_tokens() {
        let config = AuthConfig {
            allow_anonymous: false,
            tokens: None,
        };
        assert_eq!(
            authenticator(&config).err(),
            Some(ValidationError::MissingRequired("AUTH__TOKENS"))
        );
    }

    #[tokio::test]
    async fn static_tokens_resolve_principals() {
        let config = AuthConfig {
            allow_anonymous: false,
            tokens: Some(SecretString::new("abc:alice".to_string())),
        };
        let auth = authenticator(&config).unwrap();
        let metadata = crate::ports::ConnectionMetadata::new(CHAT_PATH).with_query("token", "abc");
        let principal = auth.authenticate(&metadata).await.unwrap();
        assert_eq!(principal.user_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn app_builds_with_defaults() {
        let app = build_app(&AppConfig::default()).await.unwrap();
        assert!(app.document.channels.contains_key("chat"));
    }
}
