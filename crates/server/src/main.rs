use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use server_api::{
    address_by_id, addresses_by_owner, auth::AuthConfig, create_address, delete_address, health,
    list_addresses, primary_address, set_primary_address, update_address, ApiContext, Target,
};
use shared::{
    domain::Address,
    error::{ApiError, ErrorCode},
    protocol::{AddressTargetBody, CreateAddressRequest, MessageResponse, UpdateAddressRequest},
};
use storage::{open_store, StoreBackend};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod auth;
mod config;

use app_state::AppState;
use auth::AuthUser;
use config::{load_settings, normalize_database_url};

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings()?;
    let database_url = normalize_database_url(&settings.database_url);
    let store = open_store(settings.store_backend, &database_url)
        .await
        .map_err(|error| {
            if settings.store_backend == StoreBackend::Sqlite {
                error!(
                    %database_url,
                    %error,
                    "failed to open SQLite database; verify parent directory exists and permissions are correct"
                );
            }
            error
        })?;
    let api = ApiContext {
        store,
        auth: AuthConfig {
            jwt_secret: settings.jwt_secret,
            ttl_seconds: settings.token_ttl_seconds,
        },
    };

    let app = build_router(Arc::new(AppState { api }), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, backend = %settings.store_backend, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/addresses",
            get(http_list_addresses).post(http_create_address),
        )
        .route("/addresses/owner", get(http_addresses_by_owner))
        .route("/addresses/owner/:ownerId", get(http_addresses_by_owner))
        .route(
            "/addresses/primary",
            get(http_primary_address)
                .patch(http_set_primary_address)
                .post(http_set_primary_address),
        )
        .route("/addresses/primary/:userId", get(http_primary_address))
        .route(
            "/addresses/primary/:userId/:addressId",
            patch(http_set_primary_address).post(http_set_primary_address),
        )
        .route(
            "/address",
            get(http_address_by_id)
                .put(http_update_address)
                .patch(http_update_address)
                .delete(http_delete_address),
        )
        .route(
            "/addresses/:addressId",
            get(http_address_by_id)
                .put(http_update_address)
                .patch(http_update_address)
                .delete(http_delete_address),
        )
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn http_error(err: ApiError) -> HttpError {
    (status_for(err.code), Json(err))
}

fn bad_body(rejection: JsonRejection) -> HttpError {
    let status = match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ApiError::validation(rejection.body_text())))
}

fn target(
    path: Option<Path<AddressTargetBody>>,
    body: Option<Json<AddressTargetBody>>,
) -> Target {
    Target::resolve(
        path.map(|Path(path)| path).unwrap_or_default(),
        body.map(|Json(body)| body),
    )
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    health(&state.api).await.map_err(http_error)?;
    Ok("ok")
}

async fn http_create_address(
    State(state): State<Arc<AppState>>,
    AuthUser(_caller): AuthUser,
    payload: Result<Json<CreateAddressRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Address>), HttpError> {
    let Json(req) = payload.map_err(bad_body)?;
    let address = create_address(&state.api, req).await.map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn http_list_addresses(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<Address>>, HttpError> {
    let addresses = list_addresses(&state.api, &caller)
        .await
        .map_err(http_error)?;
    Ok(Json(addresses))
}

async fn http_addresses_by_owner(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    path: Option<Path<AddressTargetBody>>,
    body: Option<Json<AddressTargetBody>>,
) -> Result<Json<Vec<Address>>, HttpError> {
    let addresses = addresses_by_owner(&state.api, &caller, target(path, body))
        .await
        .map_err(http_error)?;
    Ok(Json(addresses))
}

async fn http_address_by_id(
    State(state): State<Arc<AppState>>,
    AuthUser(_caller): AuthUser,
    path: Option<Path<AddressTargetBody>>,
    body: Option<Json<AddressTargetBody>>,
) -> Result<Json<Address>, HttpError> {
    let address = address_by_id(&state.api, target(path, body))
        .await
        .map_err(http_error)?;
    Ok(Json(address))
}

async fn http_set_primary_address(
    State(state): State<Arc<AppState>>,
    AuthUser(_caller): AuthUser,
    path: Option<Path<AddressTargetBody>>,
    body: Option<Json<AddressTargetBody>>,
) -> Result<Json<MessageResponse>, HttpError> {
    let response = set_primary_address(&state.api, target(path, body))
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn http_primary_address(
    State(state): State<Arc<AppState>>,
    AuthUser(_caller): AuthUser,
    path: Option<Path<AddressTargetBody>>,
    body: Option<Json<AddressTargetBody>>,
) -> Result<Json<Address>, HttpError> {
    let address = primary_address(&state.api, target(path, body))
        .await
        .map_err(http_error)?;
    Ok(Json(address))
}

async fn http_update_address(
    State(state): State<Arc<AppState>>,
    AuthUser(_caller): AuthUser,
    path: Option<Path<AddressTargetBody>>,
    payload: Result<Json<UpdateAddressRequest>, JsonRejection>,
) -> Result<Json<Address>, HttpError> {
    let Json(req) = payload.map_err(bad_body)?;
    let body = AddressTargetBody {
        address_id: req.address_id,
        owner_id: None,
    };
    let address = update_address(&state.api, target(path, Some(Json(body))), req.patch)
        .await
        .map_err(http_error)?;
    Ok(Json(address))
}

async fn http_delete_address(
    State(state): State<Arc<AppState>>,
    AuthUser(_caller): AuthUser,
    path: Option<Path<AddressTargetBody>>,
    body: Option<Json<AddressTargetBody>>,
) -> Result<Json<MessageResponse>, HttpError> {
    let response = delete_address(&state.api, target(path, body))
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
