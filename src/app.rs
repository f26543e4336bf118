use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, patch, post, put},
};
use log::{error, info, warn};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::analytics::{self, Analytics};
use crate::cache::{CacheStats, ResponseCache};
use crate::config::Config;
use crate::content::{
    create_record, delete_carousel_image, delete_message, delete_record, get_content,
    get_record, list_active_carousel, list_messages, list_records, mark_message_read,
    reorder_records, submit_contact, update_content, update_record,
};
use crate::downloader;
use crate::error::AppResult;
use crate::firebase::FirebaseClient;
use crate::login::{self, AuthService, require_admin};
use crate::mailer::{LogNotifier, Mailer, Notifier};
use crate::media::{self, ImageHost, host_from_config};
use crate::models::{
    AboutContent, CarouselImage, CarouselSettings, CaseStudy, ContactInfo, Project, Skill,
    Testimonial, TimelineEntry,
};
use crate::notifications::{self, NotificationCenter};
use crate::saving;
use crate::search;
use crate::store::{SharedMirror, Store, Stored};

/// Extra room on top of the upload limit for multipart framing
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub auth: Arc<AuthService>,
    pub notifications: Arc<NotificationCenter>,
    pub images: Arc<dyn ImageHost>,
    pub cache: Arc<ResponseCache>,
    pub analytics: Arc<Analytics>,
}

impl AppState {
    /// Load the store and admin account and wire up the services
    ///
    /// # Arguments
    /// * `config` - Runtime configuration
    /// * `mirror` - Remote copy of the content, if any
    /// * `notifier` - Outgoing email delivery
    /// * `images` - Where uploads are stored
    pub async fn new(
        config: Config,
        mirror: Option<SharedMirror>,
        notifier: Arc<dyn Notifier>,
        images: Arc<dyn ImageHost>,
    ) -> AppResult<Self> {
        let store = Store::open(&config.data_dir, mirror).await?;
        let auth = AuthService::init(
            &config.data_dir,
            &config.admin_username,
            config.admin_password.as_deref(),
            config.admin_email.as_deref(),
            config.session_ttl,
        )?;
        let notifications = NotificationCenter::new(notifier, config.admin_email.clone());
        let cache = ResponseCache::new(config.cache_ttl);

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            auth: Arc::new(auth),
            notifications: Arc::new(notifications),
            images,
            cache: Arc::new(cache),
            analytics: Arc::new(Analytics::new()),
        })
    }
}

fn public_collection<T: Stored>(router: Router<AppState>, base: &str) -> Router<AppState> {
    router
        .route(base, get(list_records::<T>))
        .route(&format!("{base}/:id"), get(get_record::<T>))
}

fn admin_collection<T: Stored>(router: Router<AppState>, base: &str) -> Router<AppState> {
    router
        .route(base, post(create_record::<T>))
        .route(&format!("{base}/reorder"), put(reorder_records::<T>))
        .route(
            &format!("{base}/:id"),
            put(update_record::<T>).delete(delete_record::<T>),
        )
}

/// Build the full API router
pub fn build_router(state: AppState) -> Router {
    let mut public = Router::new()
        .route("/api/health", get(health))
        .route("/api/carousel/images", get(list_active_carousel))
        .route(
            "/api/carousel/images/:id",
            get(get_record::<CarouselImage>),
        )
        .route("/api/contact-info", get(get_content::<ContactInfo>))
        .route("/api/about", get(get_content::<AboutContent>))
        .route("/api/carousel/settings", get(get_content::<CarouselSettings>))
        .route("/api/contact", post(submit_contact))
        .route("/api/search", get(search::handle_search))
        .route("/api/analytics/event", post(analytics::handle_track))
        .route("/api/auth/login", post(login::handle_login))
        .route("/api/auth/forgot-password", post(login::handle_forgot_password))
        .route("/api/auth/reset-password", post(login::handle_reset_password));
    public = public_collection::<Project>(public, "/api/projects");
    public = public_collection::<CaseStudy>(public, "/api/case-studies");
    public = public_collection::<Skill>(public, "/api/skills");
    public = public_collection::<Testimonial>(public, "/api/testimonials");
    public = public_collection::<TimelineEntry>(public, "/api/timeline");

    let mut admin = Router::new()
        .route("/api/carousel/images", post(create_record::<CarouselImage>))
        .route("/api/carousel/images/all", get(list_records::<CarouselImage>))
        .route(
            "/api/carousel/images/reorder",
            put(reorder_records::<CarouselImage>),
        )
        .route(
            "/api/carousel/images/:id",
            put(update_record::<CarouselImage>).delete(delete_carousel_image),
        )
        .route("/api/contact-info", put(update_content::<ContactInfo>))
        .route("/api/about", put(update_content::<AboutContent>))
        .route("/api/carousel/settings", put(update_content::<CarouselSettings>))
        .route(
            "/api/upload",
            post(media::handle_upload).delete(media::handle_delete_upload),
        )
        .route("/api/contact/messages", get(list_messages))
        .route(
            "/api/contact/messages/export",
            get(downloader::handle_export_messages),
        )
        .route("/api/contact/messages/:id", axum::routing::delete(delete_message))
        .route("/api/contact/messages/:id/read", patch(mark_message_read))
        .route("/api/notifications", get(notifications::handle_list))
        .route(
            "/api/notifications/read-all",
            post(notifications::handle_mark_all_read),
        )
        .route(
            "/api/notifications/:id/read",
            post(notifications::handle_mark_read),
        )
        .route("/api/analytics/summary", get(analytics::handle_summary))
        .route("/api/admin/cache", get(cache_stats).delete(clear_cache))
        .route("/api/admin/backup", get(saving::handle_backup))
        .route("/api/admin/restore", post(saving::handle_restore))
        .route("/api/auth/verify", get(login::handle_verify))
        .route("/api/auth/logout", post(login::handle_logout))
        .route(
            "/api/auth/change-password",
            post(login::handle_change_password),
        );
    admin = admin_collection::<Project>(admin, "/api/projects");
    admin = admin_collection::<CaseStudy>(admin, "/api/case-studies");
    admin = admin_collection::<Skill>(admin, "/api/skills");
    admin = admin_collection::<Testimonial>(admin, "/api/testimonials");
    admin = admin_collection::<TimelineEntry>(admin, "/api/timeline");
    let admin = admin.route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_admin,
    ));

    let body_limit = state.config.max_upload_bytes + BODY_LIMIT_SLACK;

    Router::new()
        .merge(public)
        .merge(admin)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin when none are configured, otherwise only the listed ones with
/// credentials allowed
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(Duration::from_secs(60 * 60));
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "imageProvider": state.images.name(),
        "remoteMirror": state.config.firebase.is_some(),
        "adminConfigured": state.auth.has_account(),
    }))
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.cache.clear();
    info!("Cleared {} cache entries", cleared);
    Json(json!({ "success": true, "cleared": cleared }))
}

/// Start the server and block until it is shut down
pub async fn run(config: Config) -> AppResult<()> {
    let mirror: Option<SharedMirror> = match &config.firebase {
        Some(firebase) => Some(Arc::new(FirebaseClient::new(firebase)?)),
        None => None,
    };
    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => Arc::new(Mailer::new(smtp)?),
        None => Arc::new(LogNotifier),
    };
    let images = host_from_config(&config)?;
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let addr = config.listen_addr()?;
    let state = AppState::new(config, mirror, notifier, images).await?;
    if !state.auth.has_account() {
        warn!("No admin account exists; set ADMIN_PASSWORD to enable admin routes");
    }
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
