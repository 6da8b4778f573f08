//! Remote exercise client.
//!
//! [`ExerciseClient`] is the capability a session needs from the exercise
//! service: run a query, grade it, fetch and run the reference solution,
//! reset the sandbox and patch the learner's exercise record.
//! [`HttpExerciseClient`] implements it over the service's JSON REST API.

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, Result, SessionError};
use crate::progress::{ExerciseInfo, UserExercise};
use crate::result_set::ResultSet;

// ============================================================================
// Wire types
// ============================================================================

/// Outcome of grading a query against the reference solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Whether the learner's result matches the reference.
    pub correct: bool,
    /// Optional hint from the grader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The learner's result, with mismatch markers.
    #[serde(rename = "user_result")]
    pub student_result: ResultSet,
    /// The reference result.
    #[serde(rename = "solu_result")]
    pub solution_result: ResultSet,
}

/// One reference solution of an exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Optional prose explaining the approach.
    #[serde(default)]
    pub description: Option<String>,
    /// The solution query.
    pub sql: String,
}

/// Confirmation returned by a sandbox reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRow {
    /// Server message, e.g. `Reseted Successfully!`.
    pub message: String,
}

impl ConfirmationRow {
    /// Wraps the confirmation as a one-row result set.
    #[must_use]
    pub fn into_result_set(self) -> ResultSet {
        ResultSet::single("message", self.message)
    }
}

/// Partial update of the learner's exercise record.
///
/// Absent fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserExercisePatch {
    /// New persisted editor buffer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_save: Option<String>,
    /// New favorite flag.
    #[serde(default, rename = "favourite", skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
}

impl UserExercisePatch {
    /// Patch that only persists the editor buffer.
    #[must_use]
    pub fn buffer(text: impl Into<String>) -> Self {
        Self {
            buffer_save: Some(text.into()),
            favorite: None,
        }
    }

    /// Patch that only sets the favorite flag.
    #[must_use]
    pub const fn favorite(favorite: bool) -> Self {
        Self {
            buffer_save: None,
            favorite: Some(favorite),
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    topic_short: &'a str,
    enumber: u32,
    query: &'a str,
}

#[derive(Debug, Serialize)]
struct ExerciseRequest<'a> {
    topic_short: &'a str,
    enumber: u32,
}

#[derive(Debug, Deserialize)]
struct ResultEnvelope {
    result: ResultSet,
}

#[derive(Debug, Deserialize)]
struct PatchResponse {
    #[serde(default = "default_success")]
    success: bool,
}

const fn default_success() -> bool {
    true
}

// ============================================================================
// ExerciseClient
// ============================================================================

/// Operations a session issues against the exercise service.
///
/// Every failure carries a message and a numeric code.
#[async_trait]
pub trait ExerciseClient: Send + Sync {
    /// Runs `query` in the exercise's sandbox.
    async fn execute_query(
        &self,
        topic: &str,
        exercise: u32,
        query: &str,
    ) -> std::result::Result<ResultSet, ApiError>;

    /// Grades `query` against the reference solution.
    async fn check_answer(
        &self,
        topic: &str,
        exercise: u32,
        query: &str,
    ) -> std::result::Result<CheckOutcome, ApiError>;

    /// Lists the exercise's reference solutions in order.
    async fn list_solution(
        &self,
        topic: &str,
        exercise: u32,
    ) -> std::result::Result<Vec<Solution>, ApiError>;

    /// Runs the reference solution and returns its result.
    async fn solution_result(
        &self,
        topic: &str,
        exercise: u32,
    ) -> std::result::Result<ResultSet, ApiError>;

    /// Resets the exercise's sandbox database.
    async fn reset_db(
        &self,
        topic: &str,
        exercise: u32,
    ) -> std::result::Result<ConfirmationRow, ApiError>;

    /// Updates the learner's record for the exercise.
    async fn patch_user_exercise(
        &self,
        topic: &str,
        exercise: u32,
        patch: UserExercisePatch,
    ) -> std::result::Result<(), ApiError>;
}

// ============================================================================
// HttpExerciseClient
// ============================================================================

/// [`ExerciseClient`] backed by the service's REST API.
///
/// No request timeout is set; a hung call stays pending until the server or
/// the connection gives up.
#[derive(Debug, Clone)]
pub struct HttpExerciseClient {
    http: Client,
    base: Url,
}

impl HttpExerciseClient {
    /// Creates a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ConfigValidationError` if `base_url` is not a
    /// valid absolute URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| {
            SessionError::config_validation(
                format!("apiBaseUrl '{base_url}' is not a valid URL: {e}"),
                "Use an absolute URL such as http://localhost:8000/api/",
            )
        })?;
        Ok(Self {
            http: Client::new(),
            base,
        })
    }

    /// The API root this client talks to.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::transport(format!("invalid endpoint '{path}': {e}")))
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> std::result::Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    /// `user_exercise/{topic}/{exercise}`, with the topic as one encoded
    /// path segment.
    fn user_exercise_url(
        &self,
        topic: &str,
        exercise: u32,
    ) -> std::result::Result<Url, ApiError> {
        let mut url = self.endpoint("user_exercise/")?;
        url.path_segments_mut()
            .map_err(|()| {
                ApiError::transport(format!("base URL '{}' cannot carry a path", self.base))
            })?
            .pop_if_empty()
            .push(topic)
            .push(&exercise.to_string());
        Ok(url)
    }

    async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> std::result::Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        self.get_url(self.endpoint(path)?, query).await
    }

    async fn get_url<T>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> std::result::Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    // ------------------------------------------------------------------------
    // Seed loaders
    // ------------------------------------------------------------------------

    /// Fetches the learner's record for one exercise.
    pub async fn user_exercise(
        &self,
        topic: &str,
        exercise: u32,
    ) -> std::result::Result<UserExercise, ApiError> {
        self.get_url(self.user_exercise_url(topic, exercise)?, &[])
            .await
    }

    /// Fetches the learner's records for every exercise of a topic.
    pub async fn user_exercises(
        &self,
        topic: &str,
    ) -> std::result::Result<Vec<UserExercise>, ApiError> {
        self.get("user_exercises", &[("topic_short", topic.to_string())])
            .await
    }

    /// Lists the exercises of a topic.
    pub async fn list_exercises(
        &self,
        topic: &str,
    ) -> std::result::Result<Vec<ExerciseInfo>, ApiError> {
        self.get("list_exercises", &[("topic_short", topic.to_string())])
            .await
    }
}

#[async_trait]
impl ExerciseClient for HttpExerciseClient {
    async fn execute_query(
        &self,
        topic: &str,
        exercise: u32,
        query: &str,
    ) -> std::result::Result<ResultSet, ApiError> {
        let body = QueryRequest {
            topic_short: topic,
            enumber: exercise,
            query,
        };
        let envelope: ResultEnvelope = self.post("pg-stud/execute_query/", &body).await?;
        Ok(envelope.result)
    }

    async fn check_answer(
        &self,
        topic: &str,
        exercise: u32,
        query: &str,
    ) -> std::result::Result<CheckOutcome, ApiError> {
        let body = QueryRequest {
            topic_short: topic,
            enumber: exercise,
            query,
        };
        self.post("pg-stud/check_answer_correct/", &body).await
    }

    async fn list_solution(
        &self,
        topic: &str,
        exercise: u32,
    ) -> std::result::Result<Vec<Solution>, ApiError> {
        self.get(
            "solutions",
            &[
                ("topic_short", topic.to_string()),
                ("enumber", exercise.to_string()),
            ],
        )
        .await
    }

    async fn solution_result(
        &self,
        topic: &str,
        exercise: u32,
    ) -> std::result::Result<ResultSet, ApiError> {
        let body = ExerciseRequest {
            topic_short: topic,
            enumber: exercise,
        };
        let envelope: ResultEnvelope = self.post("pg-stud/solution_result/", &body).await?;
        Ok(envelope.result)
    }

    async fn reset_db(
        &self,
        topic: &str,
        exercise: u32,
    ) -> std::result::Result<ConfirmationRow, ApiError> {
        let body = ExerciseRequest {
            topic_short: topic,
            enumber: exercise,
        };
        self.post("pg-stud/reset_db/", &body).await
    }

    async fn patch_user_exercise(
        &self,
        topic: &str,
        exercise: u32,
        patch: UserExercisePatch,
    ) -> std::result::Result<(), ApiError> {
        let url = self.endpoint("user_exercise")?;
        debug!(%url, "PATCH");
        let response = self
            .http
            .patch(url)
            .query(&[
                ("topic_short", topic.to_string()),
                ("enumber", exercise.to_string()),
            ])
            .json(&patch)
            .send()
            .await
            .map_err(transport_error)?;
        let body: PatchResponse = read_json(response).await?;
        if body.success {
            Ok(())
        } else {
            Err(ApiError::new("user exercise update was rejected", 200))
        }
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    match err.status() {
        Some(status) => ApiError::new(err.to_string(), status.as_u16()),
        None => ApiError::transport(err.to_string()),
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> std::result::Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body)
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| "request failed".to_string());
        return Err(ApiError::new(message, status.as_u16()));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::new(format!("invalid response body: {e}"), status.as_u16()))
}

/// Extracts the human-readable part of an error body.
///
/// The service answers failures with a bare JSON string, an object with a
/// `message`, `detail` or `error` field, or plain text.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::String(s)) => Some(s),
        Ok(serde_json::Value::Object(map)) => ["message", "detail", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()).map(str::to_string))
            .or_else(|| Some(trimmed.to_string())),
        _ => Some(trimmed.to_string()),
    }
}
