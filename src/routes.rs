use std::future::Future;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::{create_jwt, Auth, JwtKeys};
use crate::engine::{ClaimEngine, EnginePolicy};
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;
use crate::search::{ItemFilter, PageRequest};
use crate::storage::{is_safe_name, ImageStore, ImageStoreError};
use crate::validate::{ImageLimits, ValidationErrors};

pub fn config(cfg: &mut web::ServiceConfig) {
    extractor_errors(cfg);
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(web::resource("/auth/refresh").route(web::post().to(refresh_token)))
            .service(
                web::resource("/items")
                    .route(web::get().to(list_items))
                    .route(web::post().to(create_item)),
            )
            .service(web::resource("/items/{id}").route(web::get().to(get_item)))
            .service(web::resource("/items/{id}/claim").route(web::post().to(file_claim)))
            .service(web::resource("/items/{id}/resolve").route(web::post().to(resolve_item)))
            .service(web::resource("/my/items").route(web::get().to(my_items)))
            .service(web::resource("/my/claims").route(web::get().to(my_claims))),
    );
    // public fetch route so <img src="/uploads/lostfound/{name}"> works
    cfg.route("/uploads/lostfound/{name}", web::get().to(get_image));
    cfg.route("/metrics", web::get().to(render_metrics));
}

/// Route malformed bodies, queries and path ids through `ApiError` so they
/// carry the same `{error, message, fields}` body as handler failures.
fn extractor_errors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| invalid("body", err.to_string()).into()))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| invalid("query", err.to_string()).into()))
        .app_data(web::PathConfig::default().error_handler(|err, req| {
            tracing::debug!(path = %req.path(), "unparsable path segment: {err}");
            ApiError::NotFound(format!("no resource at {}", req.path())).into()
        }));
}

#[derive(Clone)]
pub struct AppState {
    pub engine: ClaimEngine,
    pub rate_limiter: Option<RateLimiterFacade>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, image_store: Arc<dyn ImageStore>, policy: EnginePolicy) -> Self {
        Self { engine: ClaimEngine::new(repo, image_store, policy), rate_limiter: None, metrics: None }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiterFacade) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Run a write to completion on its own task, so a client that hangs up
/// mid-request cannot leave half of it behind.
async fn detached<T, F>(fut: F) -> Result<T, ApiError>
where
    T: 'static,
    F: Future<Output = Result<T, ApiError>> + 'static,
{
    actix_web::rt::spawn(fut)
        .await
        .map_err(|e| ApiError::Storage(format!("background task failed: {e}")))?
}

const TEXT_FIELD_LIMIT: usize = 8 * 1024;

fn invalid(field: &str, msg: impl Into<String>) -> ApiError {
    let mut errs = ValidationErrors::default();
    errs.push(field, msg);
    ApiError::Validation(errs)
}

fn malformed(msg: impl Into<String>) -> ApiError {
    invalid("body", msg)
}

/// Split a multipart report into its text fields and image parts.
/// Bytes beyond the per-image limit (and images beyond the count limit)
/// are drained but not buffered; validation reports them afterwards.
async fn read_report(mut payload: Multipart, limits: ImageLimits) -> Result<(ReportForm, Vec<Upload>), ApiError> {
    let mut form = ReportForm::default();
    let mut uploads: Vec<Upload> = Vec::new();
    while let Some(mut field) = payload.try_next().await.map_err(|e| malformed(format!("multipart error: {e}")))? {
        let name = field.content_disposition().get_name().unwrap_or_default().to_string();
        if name == "images" || name == "images[]" {
            let original_name = field.content_disposition().get_filename().map(str::to_string);
            let keep = uploads.len() < limits.max_images;
            let mut bytes: Vec<u8> = Vec::new();
            while let Some(chunk) = field.try_next().await.map_err(|e| malformed(format!("stream read error: {e}")))? {
                if keep && bytes.len() <= limits.max_bytes {
                    bytes.extend_from_slice(&chunk);
                }
            }
            uploads.push(Upload { original_name, bytes });
            continue;
        }
        let mut raw: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| malformed(format!("stream read error: {e}")))? {
            if raw.len() + chunk.len() > TEXT_FIELD_LIMIT {
                return Err(malformed(format!("field '{name}' is too large")));
            }
            raw.extend_from_slice(&chunk);
        }
        let value = String::from_utf8(raw).map_err(|_| malformed(format!("field '{name}' is not valid UTF-8")))?;
        let slot = match name.as_str() {
            "type" => &mut form.kind,
            "title" => &mut form.title,
            "description" => &mut form.description,
            "category" => &mut form.category,
            "location" => &mut form.location,
            "date" => &mut form.date,
            "contactName" => &mut form.contact_name,
            "contactEmail" => &mut form.contact_email,
            "phone" => &mut form.phone,
            _ => continue,
        };
        *slot = Some(value);
    }
    Ok((form, uploads))
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "store": data.engine.repo().backend_name(),
        "timestamp": chrono::Utc::now(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/items",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of items, newest first", body = ItemPage),
        (status = 400, description = "Unknown filter value", body = crate::error::ApiErrorBody)
    )
)]
pub async fn list_items(data: web::Data<AppState>, query: web::Query<ListQuery>) -> Result<HttpResponse, ApiError> {
    let (filter, page) = ItemFilter::from_query(&query)?;
    let found = data.engine.list(&filter, page).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[utoipa::path(
    post,
    path = "/api/v1/items",
    request_body(content = ReportForm, content_type = "multipart/form-data", description = "Item fields plus up to 5 `images` parts"),
    responses(
        (status = 201, description = "Item reported", body = Item),
        (status = 400, description = "Field-level validation errors", body = crate::error::ApiErrorBody),
        (status = 401, description = "Authentication required"),
        (status = 429, description = "Too many reports"),
        (status = 500, description = "Storage failure")
    ),
    security(("bearer" = []))
)]
pub async fn create_item(auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_report(auth.user_id()) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let (form, uploads) = read_report(payload, data.engine.policy().images).await?;
    let engine = data.engine.clone();
    let owner = auth.0;
    let item = detached(async move { engine.report_item(&owner, form, uploads).await }).await?;
    Ok(HttpResponse::Created().json(item))
}

#[utoipa::path(
    get,
    path = "/api/v1/items/{id}",
    params(("id" = i64, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item", body = Item),
        (status = 404, description = "Item not found")
    )
)]
pub async fn get_item(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let item = data.engine.get_item(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(item))
}

#[utoipa::path(
    post,
    path = "/api/v1/items/{id}/claim",
    params(("id" = i64, Path, description = "Item id")),
    request_body = ClaimRequest,
    responses(
        (status = 200, description = "Claim recorded", body = ClaimResponse),
        (status = 403, description = "Claiming your own item"),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Already resolved or already claimed by caller")
    ),
    security(("bearer" = []))
)]
pub async fn file_claim(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ClaimRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_claim(auth.user_id()) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let req = payload.into_inner();
    let item_id = path.into_inner();
    let engine = data.engine.clone();
    let claimant = auth.0;
    let item = detached(async move { engine.file_claim(&claimant, item_id, req).await }).await?;
    Ok(HttpResponse::Ok().json(ClaimResponse {
        message: "Claim submitted successfully! The item owner will be notified.".into(),
        item,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/items/{id}/resolve",
    params(("id" = i64, Path, description = "Item id")),
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Item resolved", body = Item),
        (status = 403, description = "Caller is not the owner"),
        (status = 404, description = "Item or claim not found"),
        (status = 409, description = "Already resolved, or no claim chosen")
    ),
    security(("bearer" = []))
)]
pub async fn resolve_item(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ResolveRequest>,
) -> Result<HttpResponse, ApiError> {
    let item_id = path.into_inner();
    let engine = data.engine.clone();
    let caller = auth.0;
    let req = payload.into_inner();
    let item = detached(async move { engine.resolve(&caller, item_id, req).await }).await?;
    Ok(HttpResponse::Ok().json(item))
}

#[utoipa::path(
    get,
    path = "/api/v1/my/items",
    params(PageQuery),
    responses((status = 200, description = "Items reported by the caller", body = ItemPage)),
    security(("bearer" = []))
)]
pub async fn my_items(auth: Auth, data: web::Data<AppState>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let page = PageRequest::new(query.page, query.limit);
    Ok(HttpResponse::Ok().json(data.engine.my_items(&auth.0, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/my/claims",
    params(PageQuery),
    responses((status = 200, description = "Items the caller has claimed, each with `myClaim`")),
    security(("bearer" = []))
)]
pub async fn my_claims(auth: Auth, data: web::Data<AppState>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let page = PageRequest::new(query.page, query.limit);
    Ok(HttpResponse::Ok().json(data.engine.my_claims(&auth.0, page).await?))
}

pub async fn get_image(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    if !is_safe_name(&name) {
        return Err(ApiError::NotFound("image not found".into()));
    }
    match data.engine.image_store().load(&name).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header(("Content-Type", mime))
            .insert_header(("Cache-Control", "public, max-age=86400, immutable"))
            .body(bytes)),
        Err(ImageStoreError::NotFound) => Err(ApiError::NotFound("image not found".into())),
        Err(e) => {
            log::error!("image_store load error: {e}");
            Err(e.into())
        }
    }
}

pub async fn render_metrics(data: web::Data<AppState>) -> HttpResponse {
    match &data.metrics {
        Some(handle) => HttpResponse::Ok().content_type("text/plain; version=0.0.4").body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    id: String,
    name: String,
    email: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user info", body = MeResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = []))
)]
pub async fn auth_me(auth: Auth) -> HttpResponse {
    let summary = auth.0.summary();
    HttpResponse::Ok().json(MeResponse { id: summary.id, name: summary.name, email: auth.0.email })
}

pub async fn refresh_token(auth: Auth, keys: web::Data<JwtKeys>) -> Result<HttpResponse, ApiError> {
    let jwt = create_jwt(&keys, &auth.0.sub, &auth.0.name, &auth.0.email).map_err(|e| ApiError::Storage(e.to_string()))?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "token": jwt })))
}
