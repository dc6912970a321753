//! HTTP route handlers for the terminal API.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use sandbox_engine::core::types::{ExecuteOutcome, LearnerId, Progress, TrackId};
use sandbox_engine::io::catalog::Lesson;
use sandbox_engine::terminal::{TerminalError, TerminalService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/learners", post(register_learner))
        .route("/lessons/{track}", get(get_lessons))
        .route("/terminal/execute", post(execute))
        .route("/terminal/progress/{learner}/{track}", get(get_progress))
        .route("/terminal/reset/{learner}/{track}", post(reset))
}

/// Error response: a status code and `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".to_string(),
        }
    }
}

impl From<TerminalError> for ApiError {
    fn from(err: TerminalError) -> Self {
        let status = match &err {
            TerminalError::InvalidLearnerId(_) => StatusCode::BAD_REQUEST,
            TerminalError::UnknownLearner(_) | TerminalError::UnknownTrack(_) => {
                StatusCode::NOT_FOUND
            }
            TerminalError::Provisioning(_) => StatusCode::SERVICE_UNAVAILABLE,
            TerminalError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(err = %err, "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Run a blocking engine call off the async workers.
async fn blocking<T, F>(state: &AppState, call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&TerminalService) -> Result<T, TerminalError> + Send + 'static,
{
    let service = state.service.clone();
    match tokio::task::spawn_blocking(move || call(&service)).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => {
            error!(err = %err, "engine task panicked");
            Err(ApiError::internal())
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(alias = "userId")]
    pub learner_id: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RegisterResponse {
    pub learner_id: String,
    pub container_name: Option<String>,
}

/// POST /api/learners - register a learner (idempotent).
async fn register_learner(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let learner = LearnerId::new(req.learner_id.trim());
    let record = blocking(&state, move |svc| svc.register_learner(&learner)).await?;
    Ok(Json(RegisterResponse {
        learner_id: record.id.to_string(),
        container_name: record.container_name,
    }))
}

/// GET /api/lessons/{track} - lesson display payload in lesson order.
async fn get_lessons(
    State(state): State<AppState>,
    Path(track): Path<TrackId>,
) -> Result<Json<Vec<Lesson>>, ApiError> {
    let lessons = blocking(&state, move |svc| svc.lessons(track).map(<[Lesson]>::to_vec)).await?;
    Ok(Json(lessons))
}

fn default_track() -> TrackId {
    1
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(alias = "userId")]
    pub learner_id: String,
    #[serde(alias = "trackId", default = "default_track")]
    pub track_id: TrackId,
    #[serde(default)]
    pub command: String,
}

/// POST /api/terminal/execute - run a command and evaluate the current lesson.
async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteOutcome>, ApiError> {
    let learner_id = req.learner_id.trim();
    let command = req.command.trim().to_string();
    if learner_id.is_empty() || command.is_empty() {
        return Err(ApiError::bad_request("learner_id and command required"));
    }
    let learner = LearnerId::new(learner_id);
    let track = req.track_id;
    let outcome = blocking(&state, move |svc| {
        svc.execute_command(&learner, track, &command)
    })
    .await?;
    Ok(Json(outcome))
}

/// GET /api/terminal/progress/{learner}/{track}
async fn get_progress(
    State(state): State<AppState>,
    Path((learner, track)): Path<(String, TrackId)>,
) -> Result<Json<Progress>, ApiError> {
    let learner = LearnerId::new(learner);
    let progress = blocking(&state, move |svc| svc.get_progress(&learner, track)).await?;
    Ok(Json(progress))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ResetResponse {
    pub ok: bool,
}

/// POST /api/terminal/reset/{learner}/{track} - progress to 0 and a fresh environment.
async fn reset(
    State(state): State<AppState>,
    Path((learner, track)): Path<(String, TrackId)>,
) -> Result<Json<ResetResponse>, ApiError> {
    let learner_id = LearnerId::new(learner);
    let id = learner_id.clone();
    match blocking(&state, move |svc| svc.reset_course(&id, track)).await {
        Ok(()) => {
            info!(learner = %learner_id, track, "course reset");
            Ok(Json(ResetResponse { ok: true }))
        }
        Err(err) => {
            warn!(learner = %learner_id, track, status = %err.status, "reset failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sandbox_engine::core::types::EnvState;
    use sandbox_engine::io::catalog::{load_catalog, write_catalog};
    use sandbox_engine::io::config::EngineConfig;
    use sandbox_engine::io::learners::FileLearnerStore;
    use sandbox_engine::io::progress_store::FileProgressStore;
    use sandbox_engine::test_support::{FakeRuntime, lesson};
    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        _temp: TempDir,
        state: AppState,
        runtime: Arc<FakeRuntime>,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig::default().resolve_paths(temp.path());
        write_catalog(
            &config.catalog_path,
            &[lesson(1, 1, Some("^pwd$")), lesson(1, 2, Some(r"^ls(\s.*)?$"))],
        )
        .expect("catalog");
        let runtime = Arc::new(FakeRuntime::new());
        let service = TerminalService::new(
            runtime.clone(),
            &config,
            load_catalog(&config.catalog_path).expect("load catalog"),
            Box::new(FileProgressStore::new(config.progress_path())),
            Box::new(FileLearnerStore::new(config.learners_path())),
        );
        service
            .register_learner(&LearnerId::new("1"))
            .expect("register");
        Fixture {
            _temp: temp,
            state: AppState::new(service),
            runtime,
        }
    }

    fn execute_request(learner: &str, command: &str) -> ExecuteRequest {
        ExecuteRequest {
            learner_id: learner.to_string(),
            track_id: 1,
            command: command.to_string(),
        }
    }

    #[tokio::test]
    async fn execute_advances_on_matching_input() {
        let fx = fixture();
        let Json(outcome) = execute(State(fx.state.clone()), Json(execute_request("1", "pwd")))
            .await
            .expect("execute");
        assert!(outcome.passed);
        assert_eq!(outcome.progress, Progress { current: 1, total: 2 });
        assert_eq!(fx.runtime.state("linux_user_1"), Some(EnvState::Running));
    }

    #[tokio::test]
    async fn execute_rejects_blank_command_with_bad_request() {
        let fx = fixture();
        let err = execute(State(fx.state.clone()), Json(execute_request("1", "   ")))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(fx.runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn execute_for_unknown_learner_is_not_found() {
        let fx = fixture();
        let err = execute(State(fx.state.clone()), Json(execute_request("99", "pwd")))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn progress_for_unknown_track_is_not_found() {
        let fx = fixture();
        let err = get_progress(State(fx.state.clone()), Path(("1".to_string(), 5)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reset_returns_ok_and_zeroes_progress() {
        let fx = fixture();
        execute(State(fx.state.clone()), Json(execute_request("1", "pwd")))
            .await
            .expect("execute");

        let Json(body) = reset(State(fx.state.clone()), Path(("1".to_string(), 1)))
            .await
            .expect("reset");
        assert_eq!(body, ResetResponse { ok: true });

        let Json(progress) = get_progress(State(fx.state.clone()), Path(("1".to_string(), 1)))
            .await
            .expect("progress");
        assert_eq!(progress.current, 0);
    }

    #[tokio::test]
    async fn reset_with_runtime_down_is_unavailable() {
        let fx = fixture();
        fx.runtime.set_unreachable(true);
        let err = reset(State(fx.state.clone()), Path(("1".to_string(), 1)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn lessons_are_listed_in_order() {
        let fx = fixture();
        let Json(lessons) = get_lessons(State(fx.state.clone()), Path(1))
            .await
            .expect("lessons");
        let orders: Vec<i64> = lessons.iter().map(|l| l.order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[tokio::test]
    async fn register_accepts_camel_case_learner_field() {
        let fx = fixture();
        let req: RegisterRequest =
            serde_json::from_value(json!({ "userId": "2" })).expect("parse request");
        let Json(body) = register_learner(State(fx.state.clone()), Json(req))
            .await
            .expect("register");
        assert_eq!(body.learner_id, "2");
        assert_eq!(body.container_name, None);
    }

    #[test]
    fn execute_request_defaults_track_to_one() {
        let req: ExecuteRequest =
            serde_json::from_value(json!({ "userId": "1", "command": "ls" })).expect("parse");
        assert_eq!(req.track_id, 1);
    }
}
