#![forbid(unsafe_code)]

//! Axum backend for the vidshelf catalog.
//!
//! Every handler follows the same shape: load the whole snapshot from the
//! store, run one of the pure catalog functions on it and, for mutations, write
//! the whole snapshot back. There is no locking between requests, so two
//! overlapping admin edits end with whichever write landed last.

use std::{
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Path as AxumPath, Query,
        Request, State,
    },
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, patch, post},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use clap::Parser;
use mime_guess::MimeGuess;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use vidshelf::announcements::{self, AnnouncementError, NewAnnouncement};
use vidshelf::catalog::{self, AdminVideoPage, CatalogError, VideoInput};
use vidshelf::config::{RuntimeOverrides, RuntimeSettings, init_tracing, resolve_runtime_settings};
use vidshelf::listing::{self, Audience, ListParams, VideoPage};
use vidshelf::metadata::{AnnouncementRecord, CatalogStore, StoreBackend, VideoRecord};
use vidshelf::related::{self, RelatedVideo};
use vidshelf::security::{self, SESSION_COOKIE, ensure_not_root};
use vidshelf::seo;

const UPLOADS_DIR: &str = "uploads";
const VIDEO_TEMPLATE: &str = "video.html";
const ADMIN_LOGIN_PAGE: &str = "/admin/login.html";
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const PAGE_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Parser)]
#[command(name = "backend", about = "Serve the vidshelf catalog API and site")]
struct BackendArgs {
    /// Directory holding the catalog data files
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Directory with the static site
    #[arg(long)]
    www_root: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    host: Option<String>,
    /// Storage backend: json or sqlite
    #[arg(long)]
    store: Option<StoreBackend>,
    /// Env file to read settings from
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl BackendArgs {
    fn into_overrides(self) -> RuntimeOverrides {
        RuntimeOverrides {
            data_dir: self.data_dir,
            www_root: self.www_root,
            port: self.port,
            host: self.host,
            store: self.store,
            env_path: self.env_file,
        }
    }
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/CATALOG_HOST")
}

/// Shared handler state.
#[derive(Clone)]
struct AppState {
    store: Arc<CatalogStore>,
    settings: Arc<RuntimeSettings>,
}

impl AppState {
    async fn videos(&self) -> ApiResult<Vec<VideoRecord>> {
        self.store.load_videos().await.map_err(storage_error)
    }

    async fn save_videos(&self, videos: &[VideoRecord]) -> ApiResult<()> {
        self.store.save_videos(videos).await.map_err(storage_error)
    }

    async fn announcements(&self) -> ApiResult<Vec<AnnouncementRecord>> {
        self.store.load_announcements().await.map_err(storage_error)
    }

    async fn save_announcements(&self, announcements: &[AnnouncementRecord]) -> ApiResult<()> {
        self.store
            .save_announcements(announcements)
            .await
            .map_err(storage_error)
    }

    fn www_root(&self) -> &Path {
        &self.settings.www_root
    }

    fn has_session(&self, headers: &HeaderMap) -> bool {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .is_some_and(|cookie| self.settings.admin.verify_session(cookie.value()))
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound => Self::not_found("Video not found"),
            CatalogError::Invalid(message) => Self::bad_request(message),
        }
    }
}

impl From<AnnouncementError> for ApiError {
    fn from(err: AnnouncementError) -> Self {
        match err {
            AnnouncementError::NotFound => Self::not_found(err.to_string()),
            other => Self::bad_request(other.to_string()),
        }
    }
}

/// Storage failures are logged in full; clients only see a generic message.
fn storage_error(err: anyhow::Error) -> ApiError {
    error!("storage failure: {err:#}");
    ApiError::internal("Server error")
}

type ApiResult<T> = Result<T, ApiError>;

/// `Json` whose rejections keep the `{ "error": ... }` shape.
struct ApiJson<T>(T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Proof that the request carries a valid admin session cookie.
struct AdminSession;

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.has_session(&parts.headers) {
            Ok(AdminSession)
        } else {
            Err(ApiError::unauthorized())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = BackendArgs::parse();
    ensure_not_root("backend")?;

    let settings = resolve_runtime_settings(args.into_overrides())?;
    settings.warn_about_gaps();
    let host = parse_host_arg(&settings.host)?;

    let store = CatalogStore::open(settings.store, &settings.data_dir)
        .await
        .context("opening catalog store")?;
    info!(
        backend = %store.backend(),
        data_dir = %settings.data_dir.display(),
        www_root = %settings.www_root.display(),
        "catalog store ready"
    );

    let addr = SocketAddr::new(host, settings.port);
    let state = AppState {
        store: Arc::new(store),
        settings: Arc::new(settings),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/videos", get(public_list_videos))
        .route("/api/videos/{id}", get(public_get_video))
        .route("/api/videos/{id}/related", get(public_related_videos))
        .route("/api/announcements", get(public_announcements))
        .route("/api/auth/check", post(auth_check))
        .route("/api/auth/login", post(auth_login))
        .route("/api/auth/logout", post(auth_logout))
        .route("/api/auth/me", get(auth_me))
        .route(
            "/api/admin/videos",
            get(admin_list_videos).post(admin_create_video),
        )
        .route("/api/admin/videos/reorder", patch(admin_reorder_videos))
        .route(
            "/api/admin/videos/{id}",
            get(admin_get_video)
                .put(admin_update_video)
                .delete(admin_delete_video),
        )
        .route("/api/admin/videos/{id}/toggle", patch(admin_toggle_video))
        .route(
            "/api/admin/announcements",
            get(admin_list_announcements).post(admin_create_announcement),
        )
        .route(
            "/api/admin/announcements/{id}",
            delete(admin_delete_announcement),
        )
        .route("/watch/{id}", get(watch_page))
        .route("/watch/{id}/{slug}", get(watch_page_with_slug))
        .route("/video.html", get(video_page))
        .route("/sitemap.xml", get(sitemap))
        .route("/admin", get(admin_redirect))
        .route("/admin/", get(admin_redirect))
        .route("/admin/dashboard.html", get(admin_dashboard))
        .fallback(static_fallback)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {}", err);
    }
}

// ----- public API -----

async fn public_list_videos(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<VideoPage>> {
    let videos = state.videos().await?;
    let query = params.into_query();
    Ok(Json(listing::list_videos(
        &videos,
        &query,
        Audience::Public,
        Utc::now(),
    )))
}

/// Counts a view on every successful fetch.
async fn public_get_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<VideoRecord>> {
    let mut videos = state.videos().await?;
    let video = catalog::record_view(&mut videos, &id)?;
    state.save_videos(&videos).await?;
    Ok(Json(video))
}

async fn public_related_videos(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<Vec<RelatedVideo>>> {
    let videos = state.videos().await?;
    let target = catalog::find_video(&videos, &id)?;
    let candidates = related::related_candidates(target, &videos);
    let picked = related::related_videos(target, &candidates, &mut rand::rng());
    Ok(Json(picked))
}

/// Active announcements, newest first. Expired ones found along the way are
/// dropped from the store.
async fn public_announcements(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AnnouncementRecord>>> {
    let now = Utc::now();
    let mut stored = state.announcements().await?;
    if announcements::purge_expired(&mut stored, now) > 0 {
        state.save_announcements(&stored).await?;
    }
    Ok(Json(announcements::active_announcements(&stored, now)))
}

// ----- auth -----

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginRequest {
    username: String,
    password: String,
    token: String,
}

async fn auth_check(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> StatusCode {
    if state
        .settings
        .admin
        .check_password(body.username.trim(), &body.password)
    {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::UNAUTHORIZED
    }
}

async fn auth_login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Response {
    let admin = &state.settings.admin;
    if !admin.check_login(body.username.trim(), &body.password, &body.token) {
        warn!(user = %body.username.trim(), "admin login rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    info!(user = %body.username.trim(), "admin logged in");
    let cookie = security::session_cookie(&admin.session_value(), state.settings.production);
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response()
}

async fn auth_logout(State(state): State<AppState>) -> Response {
    let cookie = security::clear_session_cookie(state.settings.production);
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response()
}

async fn auth_me(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    Json(json!({ "ok": state.has_session(&headers) }))
}

// ----- admin videos -----

async fn admin_list_videos(
    State(state): State<AppState>,
    _session: AdminSession,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<AdminVideoPage>> {
    let videos = state.videos().await?;
    let query = params.into_query();
    Ok(Json(catalog::admin_list_videos(&videos, &query, Utc::now())))
}

async fn admin_get_video(
    State(state): State<AppState>,
    _session: AdminSession,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<VideoRecord>> {
    let videos = state.videos().await?;
    let video = catalog::find_video(&videos, &id)?;
    Ok(Json(video.clone()))
}

async fn admin_create_video(
    State(state): State<AppState>,
    _session: AdminSession,
    request: Request,
) -> ApiResult<Json<VideoRecord>> {
    let input = read_video_input(&state, request).await?;
    let mut videos = state.videos().await?;
    let created = catalog::create_video(&mut videos, input, &state.settings.rules, Utc::now())?;
    state.save_videos(&videos).await?;
    info!(id = %created.id, title = %created.title, "video created");
    Ok(Json(created))
}

async fn admin_update_video(
    State(state): State<AppState>,
    _session: AdminSession,
    AxumPath(id): AxumPath<String>,
    request: Request,
) -> ApiResult<Json<VideoRecord>> {
    let input = read_video_input(&state, request).await?;
    let mut videos = state.videos().await?;
    let updated =
        catalog::update_video(&mut videos, &id, input, &state.settings.rules, Utc::now())?;
    state.save_videos(&videos).await?;
    Ok(Json(updated))
}

async fn admin_delete_video(
    State(state): State<AppState>,
    _session: AdminSession,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<Value>> {
    let mut videos = state.videos().await?;
    let removed = catalog::delete_video(&mut videos, &id)?;
    state.save_videos(&videos).await?;
    info!(id = %removed.id, "video deleted");
    Ok(Json(json!({ "message": "Video deleted successfully" })))
}

async fn admin_toggle_video(
    State(state): State<AppState>,
    _session: AdminSession,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<VideoRecord>> {
    let mut videos = state.videos().await?;
    let toggled = catalog::toggle_published(&mut videos, &id, Utc::now())?;
    state.save_videos(&videos).await?;
    Ok(Json(toggled))
}

#[derive(Debug, Deserialize)]
struct ReorderRequest {
    #[serde(default)]
    order: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ReorderResponse {
    message: &'static str,
    total: usize,
}

async fn admin_reorder_videos(
    State(state): State<AppState>,
    _session: AdminSession,
    ApiJson(body): ApiJson<ReorderRequest>,
) -> ApiResult<Json<ReorderResponse>> {
    // the dashboard may send ids as numbers
    let order: Vec<String> = body
        .order
        .iter()
        .filter_map(|value| match value {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        })
        .collect();
    let mut videos = state.videos().await?;
    let total = catalog::reorder_videos(&mut videos, &order, Utc::now())?;
    state.save_videos(&videos).await?;
    Ok(Json(ReorderResponse {
        message: "Reordered",
        total,
    }))
}

/// Accepts either a JSON body or the dashboard's multipart form with an
/// optional `thumbnail` file.
async fn read_video_input(state: &AppState, request: Request) -> ApiResult<VideoInput> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        read_multipart_input(state.www_root(), multipart).await
    } else {
        let ApiJson(input) = ApiJson::<VideoInput>::from_request(request, state).await?;
        Ok(input)
    }
}

async fn read_multipart_input(www_root: &Path, mut multipart: Multipart) -> ApiResult<VideoInput> {
    let mut input = VideoInput::default();
    let mut uploaded = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "thumbnail" {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::bad_request(err.body_text()))?;
            if let Some(file_name) = file_name.filter(|name| !name.is_empty())
                && !bytes.is_empty()
            {
                uploaded = Some(save_upload(www_root, &file_name, &bytes).await?);
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?;
        match name.as_str() {
            "title" => input.title = value,
            "embedUrls" => input.embed_urls = parse_list_field(&value),
            "thumbnailUrl" => input.thumbnail_url = Some(value),
            "duration" => input.duration = Some(value),
            "category" => input.category = Some(value),
            "tags" => input.tags = parse_list_field(&value),
            "notes" => input.notes = Some(value),
            "downloadLink" => input.download_link = Some(value),
            "published" => input.published = Some(value.trim() != "false"),
            _ => {}
        }
    }

    if uploaded.is_some() {
        input.thumbnail_url = uploaded;
    }
    Ok(input)
}

/// Form fields carry lists either as a JSON array or as comma/newline
/// separated text.
fn parse_list_field(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if trimmed.starts_with('[')
        && let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed)
    {
        return items;
    }
    trimmed
        .split([',', '\n'])
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn sanitize_file_name(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Stores an uploaded thumbnail under `uploads/` and returns its public URL.
async fn save_upload(www_root: &Path, original: &str, bytes: &[u8]) -> ApiResult<String> {
    let dir = www_root.join(UPLOADS_DIR);
    let name = format!(
        "{}-{}",
        Utc::now().timestamp_millis(),
        sanitize_file_name(original)
    );
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))
        .map_err(storage_error)?;
    let target = dir.join(&name);
    tokio::fs::write(&target, bytes)
        .await
        .with_context(|| format!("writing {}", target.display()))
        .map_err(storage_error)?;
    Ok(format!("/{UPLOADS_DIR}/{name}"))
}

// ----- admin announcements -----

async fn admin_list_announcements(
    State(state): State<AppState>,
    _session: AdminSession,
) -> ApiResult<Json<Vec<AnnouncementRecord>>> {
    let stored = state.announcements().await?;
    Ok(Json(announcements::active_announcements(&stored, Utc::now())))
}

async fn admin_create_announcement(
    State(state): State<AppState>,
    _session: AdminSession,
    ApiJson(body): ApiJson<NewAnnouncement>,
) -> ApiResult<Json<AnnouncementRecord>> {
    let mut stored = state.announcements().await?;
    let created = announcements::create_announcement(&stored, &body, Utc::now())?;
    stored.push(created.clone());
    state.save_announcements(&stored).await?;
    info!(id = %created.id, expires_at = %created.expires_at, "announcement created");
    Ok(Json(created))
}

async fn admin_delete_announcement(
    State(state): State<AppState>,
    _session: AdminSession,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<Value>> {
    let mut stored = state.announcements().await?;
    announcements::delete_announcement(&mut stored, &id)?;
    state.save_announcements(&stored).await?;
    Ok(Json(json!({ "message": "Announcement deleted" })))
}

// ----- pages -----

async fn read_template(state: &AppState) -> ApiResult<String> {
    let path = state.www_root().join(VIDEO_TEMPLATE);
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))
}

async fn watch_page(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    render_watch(&state, &id, &headers).await
}

async fn watch_page_with_slug(
    State(state): State<AppState>,
    AxumPath((id, _slug)): AxumPath<(String, String)>,
    headers: HeaderMap,
) -> Response {
    render_watch(&state, &id, &headers).await
}

/// The slug is decorative: any slug resolves to the same video.
async fn render_watch(state: &AppState, id: &str, headers: &HeaderMap) -> Response {
    let videos = match state.videos().await {
        Ok(videos) => videos,
        Err(err) => return err.into_response(),
    };
    let Some(video) = videos.iter().find(|video| video.id == id && video.published) else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    let template = match read_template(state).await {
        Ok(template) => template,
        Err(err) => return err.into_response(),
    };

    let origin = seo::site_origin(headers, &state.settings.site_origin);
    let html = seo::render_watch_page(&template, video, &origin, &state.settings.site_name);
    ([(header::CACHE_CONTROL, PAGE_CACHE_CONTROL)], Html(html)).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct VideoPageQuery {
    #[serde(default)]
    id: String,
}

async fn video_page(
    State(state): State<AppState>,
    Query(query): Query<VideoPageQuery>,
    headers: HeaderMap,
) -> ApiResult<Html<String>> {
    let template = read_template(&state).await?;
    let id = query.id.trim();
    let videos = if id.is_empty() {
        Vec::new()
    } else {
        state.videos().await?
    };
    let video = videos.iter().find(|video| video.id == id);
    let origin = seo::site_origin(&headers, &state.settings.site_origin);
    Ok(Html(seo::render_video_template(
        &template,
        video,
        id,
        &origin,
        &state.settings.site_name,
    )))
}

async fn sitemap(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let videos = match state.videos().await {
        Ok(videos) => videos,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                "sitemap error",
            )
                .into_response();
        }
    };
    let origin = seo::site_origin(&headers, &state.settings.site_origin);
    (
        [
            (header::CONTENT_TYPE, "application/xml"),
            (header::CACHE_CONTROL, PAGE_CACHE_CONTROL),
        ],
        seo::render_sitemap(&videos, &origin),
    )
        .into_response()
}

async fn admin_redirect() -> Redirect {
    Redirect::to(ADMIN_LOGIN_PAGE)
}

async fn admin_dashboard(State(state): State<AppState>) -> ApiResult<Response> {
    stream_file(state.www_root().join("admin").join("index.html")).await
}

// ----- static files -----

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }

    match serve_www_path(state.www_root(), path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => stream_file(root.join("index.html")).await,
        Ok(_) => stream_file(target).await,
        Err(_) if should_fallback_to_index(request_path) => {
            stream_file(root.join("index.html")).await
        }
        Err(_) => Err(ApiError::not_found("file not found")),
    }
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

/// Extensionless paths belong to the single page app.
fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    trimmed.is_empty() || Path::new(trimmed).extension().is_none()
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = mime.to_string().parse()
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}
