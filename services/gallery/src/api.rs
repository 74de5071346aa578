use crate::albums::{Album, AlbumError, AlbumRepository, NewAlbum};
use crate::catalog::{FetchError, ImageFilter, ImageQuery, ImageRepository, ImageSort};
use crate::config::ApiConfig;
use crate::dashboard::{Dashboard, DashboardError, DashboardService};
use crate::export::{ExportError, Exporter};
use crate::gallery::GalleryView;
use crate::grouping::DateGroup;
use crate::models::{ImageId, ImageRecord};
use crate::session::{bearer_token, AuthError, IdentityProvider, OAuthProvider, Session};
use crate::subscription::{PaymentError, PaymentProvider, Plan, StorageUsage, Tier, PLANS};
use crate::upload::{BatchUploadError, UploadFile, Uploader};
use anyhow::{Context, Result};
use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub images: Arc<dyn ImageRepository>,
    pub albums: Arc<dyn AlbumRepository>,
    pub identity: Arc<dyn IdentityProvider>,
    pub payments: Arc<dyn PaymentProvider>,
    pub uploader: Arc<Uploader>,
    pub exporter: Arc<Exporter>,
    pub dashboard: Arc<DashboardService>,
    pub pool: PgPool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn auth_error(e: AuthError) -> ApiError {
    match e {
        AuthError::InvalidEmail(_) => api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_EMAIL"),
        AuthError::UnsupportedProvider(_) => {
            api_error(StatusCode::BAD_REQUEST, e.to_string(), "UNSUPPORTED_PROVIDER")
        }
        AuthError::DevLoginDisabled => api_error(StatusCode::FORBIDDEN, e.to_string(), "DEV_LOGIN_DISABLED"),
        AuthError::MissingToken | AuthError::Unauthorized => {
            api_error(StatusCode::UNAUTHORIZED, e.to_string(), "UNAUTHORIZED")
        }
        AuthError::Provider { .. } | AuthError::Request(_) => {
            error!(error = %e, "Identity provider request failed");
            api_error(StatusCode::BAD_GATEWAY, "Identity provider unavailable", "AUTH_PROVIDER_ERROR")
        }
    }
}

fn fetch_error(e: FetchError) -> ApiError {
    error!(error = %e, "Failed to query images");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to query images", "QUERY_ERROR")
}

fn album_error(e: AlbumError) -> ApiError {
    match e {
        AlbumError::EmptyName | AlbumError::LockDateInPast { .. } => {
            api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_ALBUM")
        }
        AlbumError::Query(_) => {
            error!(error = %e, "Album query failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to query albums", "QUERY_ERROR")
        }
    }
}

fn upload_error(e: BatchUploadError) -> ApiError {
    match e {
        BatchUploadError::MissingLocation => api_error(StatusCode::BAD_REQUEST, e.to_string(), "MISSING_LOCATION"),
        BatchUploadError::NoFiles => api_error(StatusCode::BAD_REQUEST, e.to_string(), "NO_FILES"),
        BatchUploadError::Failed { .. } | BatchUploadError::Aborted { .. } => {
            error!(error = %e, "Upload failed");
            api_error(StatusCode::BAD_GATEWAY, e.to_string(), "UPLOAD_ERROR")
        }
    }
}

fn export_error(e: ExportError) -> ApiError {
    match e {
        ExportError::Empty => api_error(StatusCode::BAD_REQUEST, e.to_string(), "NOTHING_TO_EXPORT"),
        ExportError::TooMany { .. } => api_error(StatusCode::PAYLOAD_TOO_LARGE, e.to_string(), "EXPORT_TOO_LARGE"),
        ExportError::Fetch { .. } | ExportError::Status { .. } => {
            error!(error = %e, "Export fetch failed");
            api_error(StatusCode::BAD_GATEWAY, e.to_string(), "EXPORT_FETCH_ERROR")
        }
        ExportError::Archive(_) | ExportError::Save(_) => {
            error!(error = %e, "Export failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to build archive", "EXPORT_ERROR")
        }
    }
}

fn payment_error(e: PaymentError) -> ApiError {
    match e {
        PaymentError::UnknownPlan(_) => api_error(StatusCode::BAD_REQUEST, e.to_string(), "UNKNOWN_PLAN"),
        PaymentError::Provider { .. } | PaymentError::Request(_) => {
            error!(error = %e, "Checkout failed");
            api_error(StatusCode::BAD_GATEWAY, "Checkout provider unavailable", "CHECKOUT_ERROR")
        }
    }
}

fn dashboard_error(e: DashboardError) -> ApiError {
    match e {
        DashboardError::Images(e) => fetch_error(e),
        DashboardError::Albums(e) => album_error(e),
    }
}

/// Protected routes resolve the bearer token into a session
#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| auth_error(AuthError::MissingToken))?;
        let token = bearer_token(header).map_err(auth_error)?;

        let session = state.identity.session_for_token(token).await.map_err(auth_error)?;
        if session.is_expired(Utc::now()) {
            return Err(auth_error(AuthError::Unauthorized));
        }
        Ok(session)
    }
}

/// Client timezone for date labels, as minutes east of UTC
#[derive(Debug, Default, Deserialize)]
pub struct TimezoneQuery {
    #[serde(default)]
    pub tz_offset_minutes: Option<i32>,
}

impl TimezoneQuery {
    fn offset(&self) -> Result<FixedOffset, ApiError> {
        client_offset(self.tz_offset_minutes)
    }
}

fn client_offset(minutes: Option<i32>) -> Result<FixedOffset, ApiError> {
    let minutes = minutes.unwrap_or(0);
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("Invalid timezone offset: {} minutes", minutes),
                "INVALID_TIMEZONE",
            )
        })
}

/// Query parameters for the image list
#[derive(Debug, Default, Deserialize)]
pub struct ImageListQuery {
    /// Only the caller's images
    #[serde(default)]
    pub owner_only: bool,
    /// Only starred images
    #[serde(default)]
    pub starred: bool,
    /// Location or uploader substring
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ImageSort,
    /// Include date groups
    #[serde(default)]
    pub grouped: bool,
    /// Maximum number of images; negative values are rejected
    pub limit: Option<u32>,
    /// Client timezone as minutes east of UTC
    pub tz_offset_minutes: Option<i32>,
}

impl ImageListQuery {
    fn image_query(&self) -> ImageQuery {
        ImageQuery {
            filter: ImageFilter {
                owner_only: self.owner_only,
                starred_only: self.starred,
                search: self.search.clone(),
            },
            sort: self.sort,
            limit: self.limit.map(i64::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageListResponse {
    pub images: Vec<ImageRecord>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<DateGroup>>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub images: Vec<ImageId>,
    pub skipped: usize,
}

/// Images to export; no ids means everything the filter returns
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub image_ids: Vec<ImageId>,
    #[serde(default)]
    pub filter: ImageFilter,
}

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        Self {
            user_id: s.user_id,
            access_token: s.access_token,
            expires_at: s.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub usage: StorageUsage,
    pub plans: &'static [Plan],
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Where to send the browser; absent for free plans
    pub redirect_url: Option<String>,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/auth/magic-link", post(send_magic_link))
        .route("/api/v1/auth/oauth/:provider", get(oauth_redirect))
        .route("/api/v1/auth/dev-login", post(dev_login))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/images", get(list_images).post(upload_images))
        .route("/api/v1/export", post(export_images))
        .route("/api/v1/albums", get(list_albums).post(create_album))
        .route("/api/v1/dashboard", get(dashboard))
        .route("/api/v1/account", get(account))
        .route("/api/v1/checkout", post(checkout))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "pika-gallery"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

#[instrument(skip(state, request))]
async fn send_magic_link(
    State(state): State<AppState>,
    Json(request): Json<MagicLinkRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .identity
        .send_magic_link(&request.email)
        .await
        .map_err(auth_error)?;
    Ok(StatusCode::ACCEPTED)
}

async fn oauth_redirect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, ApiError> {
    let provider: OAuthProvider = provider.parse().map_err(auth_error)?;
    let url = state.identity.oauth_url(provider).map_err(auth_error)?;
    Ok(Redirect::temporary(&url))
}

async fn dev_login(State(state): State<AppState>) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.identity.sign_in_as_guest().await.map_err(auth_error)?;
    info!(user_id = %session.user_id, "Guest signed in");
    Ok(Json(session.into()))
}

async fn logout(State(state): State<AppState>, session: Session) -> Result<StatusCode, ApiError> {
    state.identity.sign_out(session).await.map_err(auth_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// List images, optionally grouped by the client's calendar date
#[instrument(skip(state, session), fields(user_id = %session.user_id))]
async fn list_images(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<ImageListQuery>,
) -> Result<Json<ImageListResponse>, ApiError> {
    let offset = client_offset(params.tz_offset_minutes)?;

    let mut view = GalleryView::new(state.images.clone(), params.image_query());
    let count = view.refresh(&session).await.map_err(fetch_error)?;
    let groups = params.grouped.then(|| view.groups(&offset));

    Ok(Json(ImageListResponse {
        images: view.images().to_vec(),
        count,
        groups,
    }))
}

/// Multipart upload: a `location` text field plus one or more file fields
#[instrument(skip(state, session, multipart), fields(user_id = %session.user_id))]
async fn upload_images(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let multipart_error =
        |e: axum::extract::multipart::MultipartError| api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_MULTIPART");

    let mut location = String::new();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("location") => location = field.text().await.map_err(multipart_error)?,
            _ if field.file_name().is_some() => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                files.push(UploadFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            other => warn!(field = ?other, "Ignoring unexpected form field"),
        }
    }

    let outcome = state
        .uploader
        .upload(&session, files, &location)
        .await
        .map_err(upload_error)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            images: outcome.images,
            skipped: outcome.skipped,
        }),
    ))
}

/// Stream the export archive back as a single attachment
#[instrument(skip(state, session, request), fields(user_id = %session.user_id, ids = request.image_ids.len()))]
async fn export_images(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let mut view = GalleryView::new(
        state.images.clone(),
        ImageQuery {
            filter: request.filter,
            ..Default::default()
        },
    );
    view.refresh(&session).await.map_err(fetch_error)?;
    view.select(request.image_ids.into_iter().collect());

    let archive = view.export(&state.exporter).await.map_err(export_error)?;

    let disposition = format!("attachment; filename=\"{}\"", archive.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    )
        .into_response())
}

async fn list_albums(State(state): State<AppState>, session: Session) -> Result<Json<Vec<Album>>, ApiError> {
    let albums = state.albums.list(&session).await.map_err(album_error)?;
    Ok(Json(albums))
}

async fn create_album(
    State(state): State<AppState>,
    session: Session,
    Json(album): Json<NewAlbum>,
) -> Result<(StatusCode, Json<Album>), ApiError> {
    let album = state.albums.create(&session, album).await.map_err(album_error)?;
    Ok((StatusCode::CREATED, Json(album)))
}

async fn dashboard(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<TimezoneQuery>,
) -> Result<Json<Dashboard>, ApiError> {
    let offset = params.offset()?;
    let dashboard = state
        .dashboard
        .load(&session, &offset)
        .await
        .map_err(dashboard_error)?;
    Ok(Json(dashboard))
}

async fn account(State(state): State<AppState>, session: Session) -> Result<Json<AccountResponse>, ApiError> {
    let profile = state.images.profile(&session).await.map_err(fetch_error)?;

    Ok(Json(AccountResponse {
        user_id: session.user_id,
        username: profile
            .as_ref()
            .map(|p| p.display_username().to_string())
            .unwrap_or_else(|| "Anonymous User".to_string()),
        avatar_url: profile.as_ref().and_then(|p| p.avatar_url.clone()),
        usage: StorageUsage::from_profile(profile.as_ref()),
        plans: &PLANS,
    }))
}

#[instrument(skip(state, session, request), fields(user_id = %session.user_id, plan = %request.plan))]
async fn checkout(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let tier: Tier = request.plan.parse().map_err(payment_error)?;
    let redirect_url = state
        .payments
        .create_checkout(tier.plan(), session.user_id)
        .await
        .map_err(payment_error)?;
    Ok(Json(CheckoutResponse { redirect_url }))
}

/// Start the gallery API server, stopping gracefully when `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting gallery API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::albums::MockAlbumRepository;
    use crate::catalog::MockImageRepository;
    use crate::config::UploadPolicy;
    use crate::export::{FetchedImage, ImageFetcher};
    use crate::models::fixtures::image;
    use crate::object_store::{ObjectStore, UploadError};
    use crate::session::MockIdentityProvider;
    use crate::subscription::MockPaymentProvider;
    use axum::http::Request;
    use bytes::Bytes;
    use sqlx::postgres::PgPoolOptions;

    struct NoObjects;

    #[async_trait]
    impl ObjectStore for NoObjects {
        async fn store(&self, path: &str, _bytes: Bytes, _content_type: &str) -> Result<String, UploadError> {
            Err(UploadError::Store {
                path: path.to_string(),
                message: "unavailable".to_string(),
            })
        }
    }

    struct EchoFetcher;

    #[async_trait]
    impl ImageFetcher for EchoFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedImage, ExportError> {
            Ok(FetchedImage {
                bytes: Bytes::from(url.to_string()),
                content_type: Some("image/jpeg".to_string()),
            })
        }
    }

    fn session() -> Session {
        Session {
            user_id: Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            access_token: "tok".to_string(),
            email: None,
            expires_at: None,
        }
    }

    fn state(images: MockImageRepository, identity: MockIdentityProvider, payments: MockPaymentProvider) -> AppState {
        let images: Arc<dyn ImageRepository> = Arc::new(images);
        let albums: Arc<dyn AlbumRepository> = Arc::new(MockAlbumRepository::new());
        AppState {
            images: images.clone(),
            albums: albums.clone(),
            identity: Arc::new(identity),
            payments: Arc::new(payments),
            uploader: Arc::new(Uploader::new(
                Arc::new(NoObjects),
                images.clone(),
                UploadPolicy::WaitForAll,
                2,
            )),
            exporter: Arc::new(Exporter::new(Arc::new(EchoFetcher), 10)),
            dashboard: Arc::new(DashboardService::new(images, albums)),
            pool: PgPoolOptions::new()
                .connect_lazy("postgres://localhost/pika_test")
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_session_extractor_resolves_bearer_token() {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_session_for_token()
            .withf(|token| token == "tok")
            .returning(|_| Ok(session()));
        let state = state(MockImageRepository::new(), identity, MockPaymentProvider::new());

        let (mut parts, _) = Request::builder()
            .header(header::AUTHORIZATION, "Bearer tok")
            .body(())
            .unwrap()
            .into_parts();

        let resolved = Session::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(resolved.user_id, session().user_id);
    }

    #[tokio::test]
    async fn test_session_extractor_rejects_missing_header() {
        let state = state(
            MockImageRepository::new(),
            MockIdentityProvider::new(),
            MockPaymentProvider::new(),
        );
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();

        let (status, Json(body)) = Session::from_request_parts(&mut parts, &state).await.unwrap_err();

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_list_images_grouped_in_client_timezone() {
        let mut images = MockImageRepository::new();
        images
            .expect_fetch()
            .withf(|_, q| q.filter.owner_only && q.sort == ImageSort::Newest)
            .returning(|_, _| Ok(vec![image("late", 2024, 1, 1, 23), image("early", 2024, 1, 1, 1)]));
        let state = state(images, MockIdentityProvider::new(), MockPaymentProvider::new());

        let params = ImageListQuery {
            owner_only: true,
            grouped: true,
            tz_offset_minutes: Some(120),
            ..Default::default()
        };
        let Json(response) = list_images(State(state), session(), Query(params)).await.unwrap();

        assert_eq!(response.count, 2);
        let labels: Vec<String> = response.groups.unwrap().into_iter().map(|g| g.label).collect();
        assert_eq!(labels, vec!["January 2, 2024", "January 1, 2024"]);
    }

    #[test]
    fn test_image_list_limit_must_be_non_negative() {
        let uri: axum::http::Uri = "/api/v1/images?limit=25&sort=location".parse().unwrap();
        let Query(params) = Query::<ImageListQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(params.image_query().limit, Some(25));
        assert_eq!(params.image_query().sort, ImageSort::Location);

        let uri: axum::http::Uri = "/api/v1/images?limit=-1".parse().unwrap();
        let rejection = Query::<ImageListQuery>::try_from_uri(&uri).unwrap_err();
        assert_eq!(rejection.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_images_query_failure_maps_to_500() {
        let mut images = MockImageRepository::new();
        images
            .expect_fetch()
            .returning(|_, _| Err(FetchError::Query("boom".to_string())));
        let state = state(images, MockIdentityProvider::new(), MockPaymentProvider::new());

        let (status, Json(body)) = list_images(State(state), session(), Query(ImageListQuery::default()))
            .await
            .unwrap_err();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "QUERY_ERROR");
    }

    #[tokio::test]
    async fn test_export_selected_returns_named_attachment() {
        let mut images = MockImageRepository::new();
        images
            .expect_fetch()
            .returning(|_, _| Ok(vec![image("a", 2024, 1, 1, 0), image("b", 2024, 1, 2, 0)]));
        let state = state(images, MockIdentityProvider::new(), MockPaymentProvider::new());

        let request = ExportRequest {
            image_ids: vec![ImageId::new("b")],
            filter: ImageFilter::default(),
        };
        let response = export_images(State(state), session(), Json(request)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"selected-images.zip\""
        );
    }

    #[tokio::test]
    async fn test_export_repeated_id_stays_selected() {
        let mut images = MockImageRepository::new();
        images.expect_fetch().returning(|_, _| {
            Ok(vec![
                image("a", 2024, 1, 1, 0),
                image("b", 2024, 1, 2, 0),
                image("c", 2024, 1, 3, 0),
            ])
        });
        let state = state(images, MockIdentityProvider::new(), MockPaymentProvider::new());

        let request = ExportRequest {
            image_ids: vec![ImageId::new("b"), ImageId::new("b")],
            filter: ImageFilter::default(),
        };
        let response = export_images(State(state), session(), Json(request)).await.unwrap();

        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"selected-images.zip\""
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(body)).unwrap();
        assert_eq!(archive.len(), 1);

        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "image-1.jpeg");
        let mut contents = String::new();
        std::io::Read::read_to_string(&mut entry, &mut contents).unwrap();
        assert_eq!(contents, "https://cdn.example.com/images/b.jpg");
    }

    #[tokio::test]
    async fn test_checkout_free_plan_has_no_redirect() {
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_create_checkout()
            .withf(|plan, _| plan.tier == Tier::Free)
            .returning(|_, _| Ok(None));
        let state = state(MockImageRepository::new(), MockIdentityProvider::new(), payments);

        let Json(response) = checkout(
            State(state),
            session(),
            Json(CheckoutRequest {
                plan: "free".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.redirect_url, None);
    }

    #[tokio::test]
    async fn test_checkout_unknown_plan_rejected() {
        let state = state(
            MockImageRepository::new(),
            MockIdentityProvider::new(),
            MockPaymentProvider::new(),
        );

        let (status, _) = checkout(
            State(state),
            session(),
            Json(CheckoutRequest {
                plan: "platinum".to_string(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_timezone_offset_bounds() {
        assert!(TimezoneQuery { tz_offset_minutes: Some(-300) }.offset().is_ok());
        assert!(TimezoneQuery { tz_offset_minutes: Some(24 * 60) }.offset().is_err());
    }

    #[test]
    fn test_upload_error_mapping() {
        let (status, Json(body)) = upload_error(BatchUploadError::MissingLocation);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "MISSING_LOCATION");
    }
}
