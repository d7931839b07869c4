use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use kubroker_api::{
    ApiError, AsyncQuery, BindBody, BindingBody, CatalogResponse, DeprovisionQuery, EmptyBody,
    LastOperationBody, LastOperationQuery, OperationResponse, ProvisionBody, UnbindQuery,
    UpdateBody,
};
use serde::Serialize;

use crate::server::AppState;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.broker.health().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ready" })),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                }),
            )
        }
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

/// Async-capable operations need the caller's consent when the broker runs asynchronously.
fn require_incomplete(state: &AppState, accepts_incomplete: bool) -> ApiResult<()> {
    if state.broker.async_mode() && !accepts_incomplete {
        return Err(ApiError::async_required());
    }
    Ok(())
}

fn accepted_or(is_async: bool, done: StatusCode) -> StatusCode {
    if is_async { StatusCode::ACCEPTED } else { done }
}

pub async fn catalog(State(state): State<AppState>) -> impl IntoResponse {
    Json(CatalogResponse {
        services: state.broker.catalog().to_vec(),
    })
}

pub async fn provision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
    payload: Result<Json<ProvisionBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    require_incomplete(&state, query.accepts_incomplete)?;
    let request = body(payload)?.into_request(instance_id);

    let ack = state.broker.provision(request).await?;
    let status = accepted_or(ack.is_async, StatusCode::CREATED);
    Ok((status, Json(OperationResponse::from(ack))))
}

pub async fn update(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
    payload: Result<Json<UpdateBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    require_incomplete(&state, query.accepts_incomplete)?;
    let request = body(payload)?.into_request(instance_id);

    let ack = state.broker.update(request).await?;
    let status = accepted_or(ack.is_async, StatusCode::OK);
    Ok((status, Json(OperationResponse::from(ack))))
}

pub async fn deprovision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<DeprovisionQuery>,
) -> ApiResult<impl IntoResponse> {
    require_incomplete(&state, query.accepts_incomplete)?;

    let ack = state
        .broker
        .deprovision(query.into_request(instance_id))
        .await?;
    let status = accepted_or(ack.is_async, StatusCode::OK);
    Ok((status, Json(OperationResponse::from(ack))))
}

pub async fn last_operation(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<LastOperationQuery>,
) -> ApiResult<impl IntoResponse> {
    let response = state
        .broker
        .last_operation(query.into_request(instance_id))
        .await?;
    Ok(Json(LastOperationBody::from(response)))
}

pub async fn bind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    payload: Result<Json<BindBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request = body(payload)?.into_request(instance_id, binding_id);
    let response = state.broker.bind(request).await?;
    Ok((StatusCode::CREATED, Json(BindingBody::from(response))))
}

pub async fn unbind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<UnbindQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .broker
        .unbind(query.into_request(instance_id, binding_id))
        .await?;
    Ok((StatusCode::OK, Json(EmptyBody {})))
}
