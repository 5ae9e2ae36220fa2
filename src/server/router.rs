use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::auth::auth_router;
use super::room::room_router;
use crate::auth::{AuthService, TokenService};
use crate::config::Config;
use crate::error::Result;
use crate::rooms::{MediaService, RoomRegistry};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub tokens: Arc<TokenService>,
    pub auth: Arc<AuthService>,
    pub rooms: Arc<RoomRegistry>,
}

impl AppState {
    /// Wires the services together over one store and media backend.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        media: Arc<dyn MediaService>,
    ) -> Result<Self> {
        let auth = Arc::new(AuthService::from_config(&config, store.clone())?);
        let tokens = auth.token_service();
        let rooms = Arc::new(RoomRegistry::new(
            store.clone(),
            media,
            config.media.grant_ttl(),
            config.media.public_url.clone(),
        ));

        Ok(Self {
            store,
            config,
            tokens,
            auth,
            rooms,
        })
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth_router())
        .nest("/api/room", room_router())
        .nest("/api/admin", admin_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
