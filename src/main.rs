use axum::{
    extract::ConnectInfo,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Router,
};
use axum_prometheus::PrometheusMetricLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use courier_server::config::Config;
use courier_server::state::AppState;
use courier_server::{db, handlers, realtime};

/// Middleware that restricts access to the metrics endpoint to loopback connections only.
///
/// When `ConnectInfo` is not available (e.g. in direct oneshot tests), access is
/// denied — the metrics route is not registered in the test app anyway, so this
/// branch is unreachable in practice.
async fn require_loopback(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match connect_info {
        Some(ConnectInfo(addr)) if addr.ip().is_loopback() => next.run(req).await,
        Some(_) => StatusCode::NOT_FOUND.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing — JSON in production, human-readable in dev.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "courier_server=info,tower_http=info,sqlx=warn"
            .parse()
            .unwrap()
    });

    if std::env::var("APP_ENV").as_deref() == Ok("production") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Courier server starting...");

    // Load configuration — fatal if JWT_SECRET is missing or too short.
    let config = Config::from_env().expect("Failed to load configuration");
    info!("Configuration loaded");

    // Create database connection pool
    let pool = db::create_pool(&config.database_url, config.db_pool_size)
        .await
        .expect("Failed to create database pool");

    // Auto-run pending migrations on startup.
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    info!("Database migrations applied");

    // Run health check
    db::health_check(&pool)
        .await
        .expect("Database health check failed");
    info!("Database health check passed");

    // CORS: permissive in dev, origin-restricted in production.
    // Set APP_ENV=production and ALLOWED_ORIGINS=https://your-domain.com (see .env.example).
    let cors = if config.is_dev {
        info!("CORS: permissive (dev mode)");
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        if origins.is_empty() {
            tracing::warn!(
                "CORS: no ALLOWED_ORIGINS configured — all cross-origin requests will be denied"
            );
        } else {
            info!(
                "CORS: production mode, allowing origins: {:?}",
                config.allowed_origins
            );
        }
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
    };

    let addr = config.server_addr();

    // Create upload directory if it doesn't exist yet.
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .expect("Failed to create upload directory");
    info!("Upload directory: {}", config.upload_dir.display());

    let app_state = AppState::new(pool, config).await;

    // Prometheus metrics layer
    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    // ── Rate limiting ─────────────────────────────────────────────────────────
    // Global limit: 10 requests/second per IP, burst of 20.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .finish()
            .expect("Invalid global governor configuration"),
    );

    // Stricter limit for authentication endpoints: 2 requests/second per IP, burst of 5.
    // Nested into a sub-router so that `.route_layer()` applies only to these three routes.
    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(5)
            .finish()
            .expect("Invalid auth governor configuration"),
    );

    let auth_router = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route_layer(GovernorLayer {
            config: auth_governor_conf,
        });

    // Build router
    let app = Router::new()
        // Health check + metrics
        .route("/health", get(handlers::health::health))
        .route(
            "/metrics",
            get(move || async move { metric_handle.render() })
                .route_layer(middleware::from_fn(require_loopback)),
        )
        // Auth routes (stricter per-IP rate limit, nested via sub-router)
        .merge(auth_router)
        // Current user
        .route("/me", get(handlers::users::me))
        // User routes (protected)
        .route("/users/search", get(handlers::users::search))
        .route("/users/by-username/:username", get(handlers::users::get_by_username))
        .route("/users/me/avatar", put(handlers::users::update_my_avatar))
        .route("/users/:id", get(handlers::users::get_by_id))
        .route("/users/:id", put(handlers::users::update))
        // Chat routes (protected)
        .route("/chats", post(handlers::chats::create))
        .route("/chats", get(handlers::chats::list))
        .route("/chats/:id", get(handlers::chats::get))
        .route("/chats/:id", patch(handlers::chats::update))
        .route("/chats/:id", delete(handlers::chats::delete))
        .route("/chats/:id/avatar", post(handlers::chats::update_avatar))
        .route("/chats/:id/leave", post(handlers::chats::leave))
        .route("/chats/:id/read", post(handlers::chats::mark_read))
        .route("/chats/:id/favorite", post(handlers::chats::set_favorite))
        .route("/chats/:id/favorite", delete(handlers::chats::unset_favorite))
        .route("/chats/:id/archive", post(handlers::chats::set_archived))
        .route("/chats/:id/archive", delete(handlers::chats::unset_archived))
        .route("/chats/:id/pin", post(handlers::chats::set_pinned_in_sidebar))
        .route("/chats/:id/pin", delete(handlers::chats::unset_pinned_in_sidebar))
        .route("/chats/:id/mute", post(handlers::chats::mute))
        .route("/chats/:id/mute", delete(handlers::chats::unmute))
        .route(
            "/chats/:id/members/:uid/promote",
            post(handlers::chats::promote_member),
        )
        .route(
            "/chats/:id/members/:uid/demote",
            post(handlers::chats::demote_member),
        )
        // Message routes (protected, nested under chat)
        .route("/chats/:id/messages", post(handlers::messages::create))
        .route("/chats/:id/messages", get(handlers::messages::list))
        .route(
            "/chats/:id/messages/search",
            get(handlers::messages::search),
        )
        .route(
            "/chats/:id/messages/:mid",
            put(handlers::messages::update),
        )
        .route(
            "/chats/:id/messages/:mid",
            delete(handlers::messages::delete),
        )
        .route("/chats/:id/messages/:mid/pin", post(handlers::messages::pin))
        .route("/chats/:id/messages/:mid/pin", delete(handlers::messages::unpin))
        .route(
            "/chats/:id/messages/:mid/reactions",
            post(handlers::messages::toggle_reaction),
        )
        .route(
            "/chats/:id/pinned-message",
            get(handlers::messages::pinned_message),
        )
        .route(
            "/chats/:id/reactions",
            get(handlers::messages::reactions_for_messages),
        )
        .route("/chats/:id/forward", post(handlers::messages::forward))
        // Invite routes
        .route("/chats/:id/invites", post(handlers::invites::create))
        .route("/chats/:id/invites", get(handlers::invites::list))
        .route("/invites/:token", delete(handlers::invites::revoke))
        .route("/invites/:token/preview", get(handlers::invites::preview))
        .route("/invites/:token/join", post(handlers::invites::join))
        // File routes
        .route(
            "/files",
            post(handlers::files::upload)
                .layer(axum::extract::DefaultBodyLimit::max(52_428_800 + 65_536)), // 50 MB + multipart overhead
        )
        .route("/files/:id/download", get(handlers::files::download))
        // Signed object serving — unauthenticated, gated by HMAC signature + expiry.
        .route("/objects/:key", get(handlers::files::serve_object))
        // Settings routes
        .route("/settings", get(handlers::settings::get))
        .route("/settings", put(handlers::settings::update))
        // Sticker routes
        .route("/stickers", get(handlers::stickers::list))
        .route("/stickers/:id/image", get(handlers::stickers::image))
        // WebSocket gateway
        .route("/ws", get(realtime::ws::ws_handler))
        // ── Global rate limit (10 req/s per IP, burst 20) ──────────────────
        .layer(GovernorLayer {
            config: governor_conf,
        })
        // ── Security response headers ──────────────────────────────────────
        .layer(SetResponseHeaderLayer::if_not_present(
            header::HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        // ── Prometheus + CORS ──────────────────────────────────────────────
        .layer(prometheus_layer)
        .layer(cors)
        .with_state(app_state);

    // Start server
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    // `into_make_service_with_connect_info` populates `ConnectInfo<SocketAddr>` in
    // request extensions, needed by:
    //  - GovernorLayer's PeerIpKeyExtractor (per-IP rate limiting)
    //  - require_loopback middleware on /metrics
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server failed to start");
}
