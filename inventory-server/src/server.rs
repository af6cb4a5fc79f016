use crate::config::Config;
use anyhow::Context;
use axum::{
    Form, Json, Router, async_trait,
    body::Bytes,
    extract::{
        DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::FormRejection,
    },
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use inventory_core::{
    FsBlobStore, InventoryError, ItemRegistry, ItemView, RegisterItemRequest, UpdateItemRequest,
    Upload,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const REGISTER_FORM: &str = include_str!("../static/RegisterForm.html");
const SEARCH_FORM: &str = include_str!("../static/SearchForm.html");

const NAME_FIELD: &str = "inventory_name";
const DESCRIPTION_FIELD: &str = "description";
const PHOTO_FIELD: &str = "photo";

const JSON_CONTENT_TYPE: &str = "application/json";
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";
const URLENCODED_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub struct ServerState {
    pub registry: Arc<ItemRegistry>,
    pub config: Config,
}

/// Failure of a request, rendered as a plain-text response.
#[derive(Debug)]
pub enum ApiError {
    Inventory(InventoryError),
    /// Body that could not be read, with the status the extractor chose.
    Rejected(StatusCode, String),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Rejected(StatusCode::BAD_REQUEST, message.into())
    }
}

impl From<InventoryError> for ApiError {
    fn from(error: InventoryError) -> Self {
        Self::Inventory(error)
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self::Rejected(error.status(), error.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Inventory(InventoryError::Validation(message)) => {
                (StatusCode::BAD_REQUEST, format!("Bad Request: {}", message)).into_response()
            }
            Self::Rejected(status, message) if status == StatusCode::BAD_REQUEST => {
                (status, format!("Bad Request: {}", message)).into_response()
            }
            Self::Rejected(status, message) => (status, message).into_response(),
            Self::Inventory(error) if error.is_not_found() => {
                (StatusCode::NOT_FOUND, "Not Found").into_response()
            }
            Self::Inventory(error) => {
                tracing::error!("Request failed: {}", error);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct UpdateItemBody {
    #[serde(default)]
    inventory_name: Option<serde_json::Value>,
    #[serde(default)]
    description: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "includePhoto")]
    include_photo: Option<String>,
    #[serde(default)]
    has_photo: Option<String>,
}

/// Text fields and the optional photo of a submitted form.
///
/// Multipart and urlencoded bodies are both accepted; any other body is an
/// empty form, so required-field checks decide the outcome.
#[derive(Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    photo: Option<Upload>,
}

impl UploadForm {
    fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }
}

#[async_trait]
impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match media_type(req.headers()).as_str() {
            MULTIPART_CONTENT_TYPE => {
                let multipart = Multipart::from_request(req, state).await?;
                read_upload_form(multipart).await
            }
            URLENCODED_CONTENT_TYPE => {
                let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state).await?;
                Ok(UploadForm {
                    fields,
                    photo: None,
                })
            }
            _ => Ok(UploadForm::default()),
        }
    }
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let blob_store = FsBlobStore::new(config.storage.cache_dir.clone()).with_context(|| {
        format!(
            "failed to prepare cache directory {:?}",
            config.storage.cache_dir
        )
    })?;
    tracing::info!("Storing photos under {:?}", blob_store.base_path());

    let registry = Arc::new(ItemRegistry::new(Arc::new(blob_store)));
    let bind_addr = config.bind_addr();

    let state = Arc::new(ServerState { registry, config });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Server running at http://{}/", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route(
            "/RegisterForm.html",
            get(register_form).fallback(method_not_allowed),
        )
        .route(
            "/SearchForm.html",
            get(search_form).fallback(method_not_allowed),
        )
        .route("/register", post(register_item).fallback(method_not_allowed))
        .route("/inventory", get(list_items).fallback(method_not_allowed))
        .route(
            "/inventory/:id",
            get(get_item)
                .put(update_item)
                .delete(delete_item)
                .fallback(method_not_allowed),
        )
        .route(
            "/inventory/:id/photo",
            get(get_photo)
                .put(replace_photo)
                .fallback(method_not_allowed),
        )
        .route("/search", get(search_item).fallback(method_not_allowed))
        .fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

async fn register_form() -> Html<&'static str> {
    Html(REGISTER_FORM)
}

async fn search_form() -> Html<&'static str> {
    Html(SEARCH_FORM)
}

async fn register_item(
    State(state): State<Arc<ServerState>>,
    mut form: UploadForm,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .registry
        .register(RegisterItemRequest {
            name: form.take(NAME_FIELD).unwrap_or_default(),
            description: form.take(DESCRIPTION_FIELD),
            photo: form.photo.take(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(item.view())))
}

async fn list_items(State(state): State<Arc<ServerState>>) -> Json<Vec<ItemView>> {
    let items = state.registry.list().await;
    Json(items.iter().map(|item| item.view()).collect())
}

async fn get_item(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<ItemView>, ApiError> {
    let item = state.registry.get(&id).await?;
    Ok(Json(item.view()))
}

async fn update_item(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ItemView>, ApiError> {
    let body = match parse_update_body(&headers, &body) {
        Ok(body) => body,
        Err(error) => {
            // An unknown id outranks a malformed body.
            state.registry.get(&id).await?;
            return Err(error);
        }
    };

    // Only string values are applied; anything else leaves the field alone.
    let request = UpdateItemRequest {
        name: body
            .inventory_name
            .as_ref()
            .and_then(|value| value.as_str())
            .map(str::to_string),
        description: body
            .description
            .as_ref()
            .and_then(|value| value.as_str())
            .map(str::to_string),
    };

    let item = state.registry.update_fields(&id, request).await?;
    Ok(Json(item.view()))
}

async fn delete_item(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.delete(&id).await?;
    Ok((StatusCode::OK, "OK"))
}

async fn get_photo(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (bytes, content_type) = state.registry.read_photo(&id).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

async fn replace_photo(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    form: Result<UploadForm, ApiError>,
) -> Result<Json<ItemView>, ApiError> {
    // An unknown id outranks a malformed body.
    state.registry.get(&id).await?;
    let form = form?;

    let replacement = state.registry.replace_photo(&id, form.photo).await?;
    Ok(Json(replacement.item.view()))
}

async fn search_item(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<SearchQuery>,
) -> Result<String, ApiError> {
    let Some(id) = query.id.as_deref() else {
        return Err(InventoryError::ItemNotFound(String::new()).into());
    };

    let include_photo =
        is_truthy(query.include_photo.as_deref()) || is_truthy(query.has_photo.as_deref());

    let text = state.registry.render_search_text(id, include_photo).await?;
    Ok(text)
}

/// Query flags are set by any non-empty value, `0` and `false` included.
fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|value| !value.is_empty())
}

/// Lowercased media type of the request body, without parameters.
fn media_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// A missing or non-JSON body carries no fields.
fn parse_update_body(headers: &HeaderMap, body: &[u8]) -> Result<UpdateItemBody, ApiError> {
    if body.is_empty() || media_type(headers) != JSON_CONTENT_TYPE {
        return Ok(UpdateItemBody::default());
    }

    serde_json::from_slice(body).map_err(|error| ApiError::bad_request(error.to_string()))
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == PHOTO_FIELD {
            let file_name = field.file_name().map(str::to_string);
            let payload = field.bytes().await?;

            // Browsers send an empty, unnamed file part when nothing was picked
            match file_name {
                Some(file_name) if !file_name.is_empty() => {
                    form.photo = Some(Upload::new(file_name, payload));
                }
                _ => {}
            }
        } else {
            let value = field.text().await?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}
