use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use crate::agents::registry::{default_team, AgentRole};
use crate::models::CreateTaskRequest;
use super::SimulatorState;

type ApiError = (StatusCode, Json<Value>);

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Task not found"})))
}

pub async fn health_check(State(state): State<SimulatorState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "marketdesk-simulator",
        "version": env!("CARGO_PKG_VERSION"),
        "tasks": state.tasks.len(),
    }))
}

pub async fn create_task(
    State(state): State<SimulatorState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if req.symbol.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, Json(json!({"error": "symbol is required"}))));
    }
    let team = resolve_team(&req.agents)?;
    let id = uuid::Uuid::new_v4().to_string();
    let task = state.start_task(id.clone(), req.symbol.trim().to_string(), team);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "status": "pending",
            "symbol": task.symbol,
        })),
    ))
}

pub async fn list_tasks(State(state): State<SimulatorState>) -> Json<Value> {
    let tasks: Vec<_> = state.tasks.iter().map(|t| t.value().clone()).collect();
    let mut snapshots = Vec::with_capacity(tasks.len());
    for task in tasks {
        snapshots.push(task.snapshot().await);
    }
    Json(json!({ "tasks": snapshots, "total": snapshots.len() }))
}

pub async fn get_task(
    State(state): State<SimulatorState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = state.get(&id).ok_or_else(not_found)?;
    let snapshot = task.snapshot().await;
    Ok(Json(json!(snapshot)))
}

pub async fn get_result(
    State(state): State<SimulatorState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = state.get(&id).ok_or_else(not_found)?;
    match task.result().await {
        Some(result) => Ok(Json(result)),
        None => Err((StatusCode::CONFLICT, Json(json!({"error": "Result not ready"})))),
    }
}

pub async fn cancel_task(
    State(state): State<SimulatorState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.cancel(&id) {
        Ok(Json(json!({"cancelled": true})))
    } else {
        Err(not_found())
    }
}

pub(crate) fn resolve_team(names: &[String]) -> Result<Vec<AgentRole>, ApiError> {
    if names.is_empty() {
        return Ok(default_team());
    }
    let mut team = Vec::with_capacity(names.len());
    for name in names {
        match AgentRole::normalize(name) {
            Some(role) => team.push(role),
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("Unknown agent: {}", name)})),
                ))
            }
        }
    }
    team.sort();
    team.dedup();
    Ok(team)
}
