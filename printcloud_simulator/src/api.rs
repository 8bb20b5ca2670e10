//! Routes of the simulated print service.

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::{Authorization, HeaderMapExt};
use std::collections::HashMap;

use crate::models::{
    BaudRateUpdate, CommandBody, CreatePrinter, JobUpdate, OnlineUpdate, PrinterList, StartJob,
    StartedJob,
};
use crate::state::{JobAction, JobUpdateError, SimState};

/// Service routes behind basic auth, plus unauthenticated `/sim` control routes.
pub fn create_router(state: SimState) -> Router {
    let service = Router::new()
        .route("/printer/instance/", get(list_printers).post(create_printer))
        .route("/printer/instance/{id}/", get(printer_status).put(update_printer))
        .route("/printer/instance/{id}/command/", post(send_command))
        .route("/command/{id}/", get(command_ack))
        .route("/print/job/{id}/", put(update_job))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_basic_auth));

    let control = Router::new()
        .route("/sim/printers/{id}/jobs", post(start_job))
        .route("/sim/printers/{id}/online", put(set_online));

    service.merge(control).with_state(state)
}

async fn require_basic_auth(
    State(state): State<SimState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let authorized = req
        .headers()
        .typed_get::<Authorization<Basic>>()
        .is_some_and(|auth| state.accepts(auth.username(), auth.password()));
    if !authorized {
        tracing::warn!("Rejecting unauthenticated request to {}", req.uri());
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

/// GET /printer/instance/?filter[client]=...
async fn list_printers(
    State(state): State<SimState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<PrinterList> {
    let client = params.get("filter[client]").map(String::as_str);
    Json(PrinterList {
        resources: state.list_printers(client),
    })
}

/// POST /printer/instance/
async fn create_printer(
    State(state): State<SimState>,
    Json(body): Json<CreatePrinter>,
) -> impl IntoResponse {
    let id = state.create_printer(body);
    (
        StatusCode::CREATED,
        [(header::LOCATION, state.printer_uri(id).to_string())],
    )
}

async fn printer_status(State(state): State<SimState>, Path(id): Path<u64>) -> Response {
    match state.status(id) {
        Some(status) => Json(status).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn update_printer(
    State(state): State<SimState>,
    Path(id): Path<u64>,
    Json(body): Json<BaudRateUpdate>,
) -> StatusCode {
    if state.update_baud_rate(id, body.baud_rate) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn send_command(
    State(state): State<SimState>,
    Path(id): Path<u64>,
    Json(body): Json<CommandBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let command = state
        .submit_command(id, &body.command)
        .ok_or(StatusCode::NOT_FOUND)?;
    tracing::debug!("Printer {} got command {} as {}", id, body.command, command);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, state.command_uri(command).to_string())],
    ))
}

async fn command_ack(State(state): State<SimState>, Path(id): Path<u64>) -> Response {
    match state.command_ack(id) {
        Some(ack) => Json(ack).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn update_job(
    State(state): State<SimState>,
    Path(id): Path<u64>,
    Json(body): Json<JobUpdate>,
) -> StatusCode {
    let Some(action) = JobAction::parse(&body.status) else {
        return StatusCode::BAD_REQUEST;
    };
    match state.update_job(id, action) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(JobUpdateError::NotFound) => StatusCode::NOT_FOUND,
        Err(JobUpdateError::Conflict) => StatusCode::CONFLICT,
    }
}

/// POST /sim/printers/{id}/jobs
async fn start_job(
    State(state): State<SimState>,
    Path(id): Path<u64>,
    body: Option<Json<StartJob>>,
) -> Result<(StatusCode, Json<StartedJob>), StatusCode> {
    let spec = body.map(|Json(spec)| spec).unwrap_or_default();
    let job = state.start_job(id, spec).ok_or(StatusCode::NOT_FOUND)?;
    Ok((
        StatusCode::CREATED,
        Json(StartedJob {
            job_uri: state.job_uri(job),
        }),
    ))
}

async fn set_online(
    State(state): State<SimState>,
    Path(id): Path<u64>,
    Json(body): Json<OnlineUpdate>,
) -> StatusCode {
    if state.set_online(id, body.online) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
