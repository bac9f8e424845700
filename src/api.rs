//! Thin HTTP surface over the engine.
//!
//! Authentication is an external concern; callers arrive with an `x-user-id`
//! header set by the auth layer in front of this service, and every handler
//! checks ownership through the engine. Handlers translate coordinates and
//! payloads, nothing more.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::{OpenApi, ToSchema};

use crate::course::{Course, CurriculumOutline};
use crate::engine::{
    ExamResponse, ExamSubmitResponse, FlashcardsResponse, GenerationStatusResponse,
    LearningEngine, LessonResponse, QuizResponse, QuizSubmitResponse, SubmissionRequest,
};
use crate::error::Error;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LearningEngine>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            // generation and grading failures are recovered with fallbacks
            // inside the engine; reaching here means an internal fault
            Error::Generation(_) | Error::Grading(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Persistence(_) | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

fn user_id(headers: &HeaderMap) -> Result<String, Error> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Validation("missing x-user-id header".to_string()))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    pub topic: String,
    #[serde(default)]
    pub learner_level: Option<String>,
    pub outline: CurriculumOutline,
}

#[utoipa::path(post, path = "/api/course", request_body = CreateCourseRequest,
    responses((status = 200, description = "Created course document")))]
async fn create_course(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateCourseRequest>,
) -> Result<Json<Course>, Error> {
    let user = user_id(&headers)?;
    let course = state
        .engine
        .create_course(&user, &req.topic, req.learner_level, req.outline)
        .await?;
    Ok(Json(course))
}

#[utoipa::path(get, path = "/api/course/{course_id}",
    responses((status = 200, description = "Course document")))]
async fn get_course(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Result<Json<Course>, Error> {
    let user = user_id(&headers)?;
    Ok(Json(state.engine.require_course(&user, &course_id).await?))
}

#[utoipa::path(get,
    path = "/api/course/{course_id}/module/{module_id}/submodule/{sub_module_id}",
    responses((status = 200, body = LessonResponse)))]
async fn get_lesson(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((course_id, module_id, sub_module_id)): Path<(String, String, String)>,
) -> Result<Json<LessonResponse>, Error> {
    let user = user_id(&headers)?;
    Ok(Json(
        state
            .engine
            .get_lesson(&user, &course_id, &module_id, &sub_module_id)
            .await?,
    ))
}

#[utoipa::path(post,
    path = "/api/course/{course_id}/module/{module_id}/submodule/{sub_module_id}/complete",
    responses((status = 200)))]
async fn complete_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((course_id, module_id, sub_module_id)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, Error> {
    let user = user_id(&headers)?;
    state
        .engine
        .complete_content(&user, &course_id, &module_id, &sub_module_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[utoipa::path(get,
    path = "/api/course/{course_id}/module/{module_id}/submodule/{sub_module_id}/quiz",
    responses((status = 200, body = QuizResponse)))]
async fn get_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((course_id, module_id, sub_module_id)): Path<(String, String, String)>,
) -> Result<Json<QuizResponse>, Error> {
    let user = user_id(&headers)?;
    Ok(Json(
        state
            .engine
            .get_quiz(&user, &course_id, &module_id, &sub_module_id)
            .await?,
    ))
}

#[utoipa::path(post,
    path = "/api/course/{course_id}/module/{module_id}/submodule/{sub_module_id}/quiz/submit",
    request_body = SubmissionRequest,
    responses((status = 200, body = QuizSubmitResponse)))]
async fn submit_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((course_id, module_id, sub_module_id)): Path<(String, String, String)>,
    Json(submission): Json<SubmissionRequest>,
) -> Result<Json<QuizSubmitResponse>, Error> {
    let user = user_id(&headers)?;
    Ok(Json(
        state
            .engine
            .submit_quiz(&user, &course_id, &module_id, &sub_module_id, submission)
            .await?,
    ))
}

#[utoipa::path(get, path = "/api/course/{course_id}/module/{module_id}/exam",
    responses((status = 200, body = ExamResponse)))]
async fn get_exam(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((course_id, module_id)): Path<(String, String)>,
) -> Result<Json<ExamResponse>, Error> {
    let user = user_id(&headers)?;
    Ok(Json(
        state.engine.get_exam(&user, &course_id, &module_id).await?,
    ))
}

#[utoipa::path(post, path = "/api/course/{course_id}/module/{module_id}/exam/submit",
    request_body = SubmissionRequest,
    responses((status = 200, body = ExamSubmitResponse)))]
async fn submit_exam(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((course_id, module_id)): Path<(String, String)>,
    Json(submission): Json<SubmissionRequest>,
) -> Result<Json<ExamSubmitResponse>, Error> {
    let user = user_id(&headers)?;
    Ok(Json(
        state
            .engine
            .submit_exam(&user, &course_id, &module_id, submission)
            .await?,
    ))
}

#[utoipa::path(get, path = "/api/course/{course_id}/generation-status",
    responses((status = 200, body = GenerationStatusResponse)))]
async fn generation_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Result<Json<GenerationStatusResponse>, Error> {
    let user = user_id(&headers)?;
    Ok(Json(
        state.engine.generation_status(&user, &course_id).await?,
    ))
}

#[utoipa::path(get, path = "/api/course/{course_id}/module/{module_id}/flashcards",
    responses((status = 200, body = FlashcardsResponse)))]
async fn flashcards(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((course_id, module_id)): Path<(String, String)>,
) -> Result<Json<FlashcardsResponse>, Error> {
    let user = user_id(&headers)?;
    Ok(Json(
        state.engine.flashcards(&user, &course_id, &module_id).await?,
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_course,
        get_course,
        get_lesson,
        complete_content,
        get_quiz,
        submit_quiz,
        get_exam,
        submit_exam,
        generation_status,
        flashcards,
    ),
    components(schemas(CreateCourseRequest, SubmissionRequest))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/course", post(create_course))
        .route("/api/course/{course_id}", get(get_course))
        .route(
            "/api/course/{course_id}/module/{module_id}/submodule/{sub_module_id}",
            get(get_lesson),
        )
        .route(
            "/api/course/{course_id}/module/{module_id}/submodule/{sub_module_id}/complete",
            post(complete_content),
        )
        .route(
            "/api/course/{course_id}/module/{module_id}/submodule/{sub_module_id}/quiz",
            get(get_quiz),
        )
        .route(
            "/api/course/{course_id}/module/{module_id}/submodule/{sub_module_id}/quiz/submit",
            post(submit_quiz),
        )
        .route(
            "/api/course/{course_id}/module/{module_id}/exam",
            get(get_exam),
        )
        .route(
            "/api/course/{course_id}/module/{module_id}/exam/submit",
            post(submit_exam),
        )
        .route(
            "/api/course/{course_id}/generation-status",
            get(generation_status),
        )
        .route(
            "/api/course/{course_id}/module/{module_id}/flashcards",
            get(flashcards),
        )
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        // generation calls are slow but bounded; give requests headroom
        // beyond the generator timeout before cutting them off
        .layer(TimeoutLayer::new(Duration::from_secs(120)))
        .with_state(state)
}
