//! End-to-end tests for the session controller over HTTP.
//!
//! Each test starts an axum stub of the exercise service on an ephemeral
//! localhost port and drives a session through the reqwest-backed client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlt_render::{render_workspace, PaneView};
use sqlt_session::{
    Command, ErrorCategory, EventBroadcaster, ExerciseClient, ExerciseRoute, ExerciseState,
    HttpExerciseClient, KeyChord, KeyboardHub, PaneId, Platform, Session, SessionError,
    SessionEvent, SessionPhase, SessionSeed, SessionSettings, TopicProgress, Workspace,
};
use tokio::sync::{broadcast, Notify};
use tokio::time::{sleep, timeout, Instant};

const TOPIC: &str = "joins";
const SOLUTION_SQL: &str = "SELECT name FROM city;";

// ============================================================================
// Stub exercise service
// ============================================================================

/// Request log and control knobs shared with the handlers.
#[derive(Default)]
struct StubService {
    requests: Mutex<Vec<(String, Value)>>,
    gate: Notify,
}

type Shared = Arc<StubService>;

impl StubService {
    fn record(&self, endpoint: &str, body: Value) {
        self.requests
            .lock()
            .expect("request log poisoned")
            .push((endpoint.to_string(), body));
    }

    fn endpoints(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("request log poisoned")
            .iter()
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }

    fn bodies(&self, endpoint: &str) -> Vec<Value> {
        self.requests
            .lock()
            .expect("request log poisoned")
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

fn city_rows() -> Value {
    json!([
        {"name": "Graz", "population": 290_000},
        {"name": "Linz", "population": 210_000},
    ])
}

fn name_rows() -> Value {
    json!([{"name": "Graz"}, {"name": "Linz"}])
}

fn is_correct(query: &str) -> bool {
    query.to_lowercase().contains("select name from city")
}

async fn execute_query(State(stub): State<Shared>, Json(body): Json<Value>) -> Response {
    stub.record("execute_query", body.clone());
    let query = body["query"].as_str().unwrap_or_default().to_string();

    if query.contains("pg_sleep") {
        stub.gate.notified().await;
    }
    if query.contains("nope") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!("relation \"nope\" does not exist")),
        )
            .into_response();
    }
    Json(json!({"result": {"result": city_rows()}})).into_response()
}

async fn check_answer(State(stub): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    stub.record("check_answer", body.clone());
    let query = body["query"].as_str().unwrap_or_default();

    if is_correct(query) {
        Json(json!({
            "correct": true,
            "user_result": {"result": name_rows()},
            "solu_result": {"result": name_rows()},
        }))
    } else {
        Json(json!({
            "correct": false,
            "message": "Only the city names are asked for",
            "user_result": {"result": city_rows(), "miss_cols": ["population"], "miss_rows": [1]},
            "solu_result": {"result": name_rows()},
        }))
    }
}

async fn solution_result(State(stub): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    stub.record("solution_result", body);
    Json(json!({"result": {"result": name_rows()}}))
}

async fn reset_db(State(stub): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    stub.record("reset_db", body);
    Json(json!({"message": "Reseted Successfully!"}))
}

async fn list_solution(
    State(stub): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    stub.record("solutions", json!(params));
    Json(json!([
        {"id": 1, "snumber": 1, "sql": SOLUTION_SQL, "description": "Project only the name column"},
        {"id": 2, "snumber": 2, "sql": "SELECT c.name FROM city c;"},
    ]))
}

async fn patch_user_exercise(
    State(stub): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    stub.record("patch_user_exercise", json!({"params": params, "body": body}));
    Json(json!({"success": true}))
}

async fn user_exercise(
    State(stub): State<Shared>,
    Path((topic, enumber)): Path<(String, u32)>,
) -> Response {
    stub.record("user_exercise", json!({"topic": topic, "enumber": enumber}));
    if !(1..=3).contains(&enumber) {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response();
    }
    Json(json!({
        "exercise": 100 + enumber,
        "is_correct": null,
        "favourite": enumber == 2,
        "buffer_save": format!("SELECT * FROM saved_{enumber}"),
    }))
    .into_response()
}

async fn user_exercises(State(stub): State<Shared>) -> Json<Value> {
    stub.record("user_exercises", Value::Null);
    Json(json!([
        {"exercise": 101, "is_correct": null, "favourite": false},
        {"exercise": 102, "is_correct": true, "favourite": true},
        {"exercise": 103, "is_correct": true, "favourite": false},
    ]))
}

async fn list_exercises(State(stub): State<Shared>) -> Json<Value> {
    stub.record("list_exercises", Value::Null);
    Json(json!([
        {"id": 101, "topic": 1, "enumber": 1, "title": "Cities"},
        {"id": 102, "topic": 1, "enumber": 2, "title": "Countries"},
        {"id": 103, "topic": 1, "enumber": 3},
    ]))
}

fn stub_router(stub: Shared) -> Router {
    Router::new()
        .route("/api/pg-stud/execute_query/", post(execute_query))
        .route("/api/pg-stud/check_answer_correct/", post(check_answer))
        .route("/api/pg-stud/solution_result/", post(solution_result))
        .route("/api/pg-stud/reset_db/", post(reset_db))
        .route("/api/solutions", get(list_solution))
        .route("/api/user_exercise", patch(patch_user_exercise))
        .route("/api/user_exercise/:topic/:enumber", get(user_exercise))
        .route("/api/user_exercises", get(user_exercises))
        .route("/api/list_exercises", get(list_exercises))
        .with_state(stub)
}

/// Spawns the stub service and returns its API base URL.
async fn spawn_stub() -> (String, Shared) {
    let stub = Shared::default();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr: SocketAddr = listener.local_addr().expect("Failed to get local addr");

    let router = stub_router(Arc::clone(&stub));
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    (format!("http://{addr}/api/"), stub)
}

// ============================================================================
// Helpers
// ============================================================================

fn http_client(base_url: &str) -> Arc<dyn ExerciseClient> {
    Arc::new(HttpExerciseClient::new(base_url).expect("valid base URL"))
}

fn settings() -> SessionSettings {
    SessionSettings::new(Platform::Other).expect("standard keymap")
}

fn session(base_url: &str, query: &str, events: &EventBroadcaster) -> Session {
    let seed = SessionSeed {
        query: query.to_string(),
        ..SessionSeed::default()
    };
    Session::new(
        ExerciseRoute::new(TOPIC, 1),
        http_client(base_url),
        settings(),
        seed,
        events.clone(),
    )
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Polls `condition` until it holds or two seconds pass.
async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

// ============================================================================
// Toolbar operations
// ============================================================================

/// Tests that executing sends the buffer and shows the rows.
#[tokio::test]
async fn test_execute_round_trip() {
    let (base_url, stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let session = session(&base_url, "SELECT * FROM city", &events);

    session.execute().await.expect("execute should succeed");

    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Executed);
    assert!(!snap.toolbar_locked);
    let result = snap.last_result.expect("result");
    assert_eq!(result.columns(), vec!["name", "population"]);
    assert_eq!(result.cell_text(1, "name"), "Linz");
    assert_eq!(snap.visible_panes.len(), 1);
    assert!(snap.visible_panes.contains(&PaneId::QueryResult));

    let bodies = stub.bodies("execute_query");
    assert_eq!(
        bodies,
        vec![json!({"topic_short": TOPIC, "enumber": 1, "query": "SELECT * FROM city"})]
    );
}

/// Tests that a correct answer shows both panes and positive feedback.
#[tokio::test]
async fn test_check_correct_answer() {
    let (base_url, _stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let mut rx = events.subscribe();
    let session = session(&base_url, "SELECT name FROM city", &events);

    session.check().await.expect("check should succeed");

    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Checked);
    assert_eq!(snap.last_correct, Some(true));
    assert!(snap.visible_panes.contains(&PaneId::Solution));
    assert!(snap.solution_result.is_some());

    let feedback = session.take_feedback().await.expect("feedback");
    assert!(feedback.polarity.is_positive());
    assert!(session.take_feedback().await.is_none());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Feedback(_))));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::PhaseChanged(p) if p.from == SessionPhase::New && p.to == SessionPhase::Checked
    )));
}

/// Tests that a wrong answer carries mismatch markers into the rendered pane.
#[tokio::test]
async fn test_check_wrong_answer_renders_mismatches() {
    let (base_url, _stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let session = session(&base_url, "SELECT * FROM city", &events);

    session.check().await.expect("check should succeed");

    let snap = session.snapshot().await;
    assert_eq!(snap.last_correct, Some(false));
    let feedback = snap.feedback.clone().expect("feedback");
    assert!(!feedback.polarity.is_positive());
    assert_eq!(
        feedback.detail.as_deref(),
        Some("Only the city names are asked for")
    );

    let markdown = render_workspace(&PaneView::from_snapshot(&snap));
    assert!(markdown.contains("| name | ✗ population |"));
    assert!(markdown.contains("| ✗ Linz | 210000 |"));
    assert!(markdown.contains("### Expected result"));
}

/// Tests that a natural join forces every badge to wrong.
#[tokio::test]
async fn test_natural_join_forces_wrong_badges() {
    let (base_url, _stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let session = session(
        &base_url,
        "SELECT name FROM city NATURAL JOIN country",
        &events,
    );

    session.check().await.expect("check should succeed");

    let snap = session.snapshot().await;
    assert_eq!(snap.last_correct, Some(true));
    assert!(snap.natural_join);
    assert_eq!(session.badge(1).await, ExerciseState::Wrong);
    assert_eq!(session.badge(2).await, ExerciseState::Wrong);
}

/// Tests that the solution is inserted beneath the commented buffer and run.
#[tokio::test]
async fn test_show_solution_rewrites_buffer() {
    let (base_url, stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let session = session(&base_url, "SELECT *\nFROM city", &events);

    session.show_solution().await.expect("show solution should succeed");

    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Solved);
    assert!(snap
        .query
        .starts_with("-- SELECT *\n-- FROM city\n-- Solutions:\n-- 1)\n-- Project only the name column\n"));
    assert!(snap.query.contains(&format!("\n{SOLUTION_SQL}\n")));
    assert!(snap.query.contains("-- 2)\n\nSELECT c.name FROM city c;\n"));
    assert!(snap.visible_panes.contains(&PaneId::Solution));

    let executed = stub.bodies("execute_query");
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0]["query"], json!(snap.query));

    let endpoints = stub.endpoints();
    assert!(endpoints.contains(&"solutions".to_string()));
    assert!(endpoints.contains(&"solution_result".to_string()));
    assert_eq!(stub.bodies("solutions")[0], json!({"topic_short": TOPIC, "enumber": "1"}));
}

/// Tests that a reset saves the buffer and shows the confirmation row.
#[tokio::test]
async fn test_reset_saves_buffer_and_confirms() {
    let (base_url, stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let session = session(&base_url, "DELETE FROM city", &events);

    session.execute().await.expect("execute should succeed");
    session.check().await.expect("check should succeed");
    session.reset_database().await.expect("reset should succeed");
    session.flush_persistence().await;

    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Reset);
    let result = snap.last_result.expect("confirmation");
    assert_eq!(result.columns(), vec!["message"]);
    assert_eq!(result.cell_text(0, "message"), "Reseted Successfully!");
    assert!(!snap.visible_panes.contains(&PaneId::Solution));

    let patches = stub.bodies("patch_user_exercise");
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0]["body"], json!({"buffer_save": "DELETE FROM city"}));
    assert_eq!(
        patches[0]["params"],
        json!({"topic_short": TOPIC, "enumber": "1"})
    );
    assert_eq!(stub.bodies("reset_db").len(), 1);
}

/// Tests that a too-short buffer never reaches the server.
#[tokio::test]
async fn test_short_query_rejected_locally() {
    let (base_url, stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let mut rx = events.subscribe();
    let session = session(&base_url, " ab ", &events);

    for command in [Command::Execute, Command::Check, Command::ShowSolution] {
        let err = session.dispatch(command).await.expect_err("should reject");
        assert!(matches!(err, SessionError::NoQuery { .. }), "{command}");
    }

    assert!(stub.endpoints().is_empty());
    assert_eq!(session.phase().await, SessionPhase::New);
    let errors = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Error(p) if p.category == ErrorCategory::Validation))
        .count();
    assert_eq!(errors, 3);
}

/// Tests that a short buffer can still reset the sandbox without being saved.
#[tokio::test]
async fn test_reset_with_short_buffer() {
    let (base_url, stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let session = session(&base_url, " ab ", &events);

    session
        .dispatch(Command::Reset)
        .await
        .expect("reset should run");
    session.flush_persistence().await;

    assert_eq!(session.phase().await, SessionPhase::Reset);
    assert_eq!(stub.bodies("reset_db").len(), 1);
    assert!(stub.bodies("patch_user_exercise").is_empty());
}

/// Tests that a server error is surfaced and leaves the phase alone.
#[tokio::test]
async fn test_server_error_surfaced() {
    let (base_url, _stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let mut rx = events.subscribe();
    let session = session(&base_url, "SELECT * FROM nope", &events);

    let err = session.execute().await.expect_err("execute should fail");
    match &err {
        SessionError::Remote { source, .. } => {
            assert_eq!(source.code, 400);
            assert_eq!(source.message, "relation \"nope\" does not exist");
        }
        other => unreachable!("expected remote error, got {other:?}"),
    }

    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::New);
    assert!(!snap.toolbar_locked);
    assert!(snap.last_result.is_none());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Error(p) if p.category == ErrorCategory::Remote && p.message.contains("nope")
    )));
}

/// Tests that no commands run while a call is in flight.
#[tokio::test]
async fn test_locked_toolbar_rejects_commands() {
    let (base_url, stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let session = session(&base_url, "SELECT pg_sleep(10)", &events);

    let running = {
        let session = session.clone();
        tokio::spawn(async move { session.execute().await })
    };
    assert!(wait_until(|| session.is_locked()).await, "toolbar never locked");

    let err = session.check().await.expect_err("check should be rejected");
    assert!(matches!(err, SessionError::ToolbarLocked { .. }));
    assert!(matches!(
        session.clear().await,
        Err(SessionError::ToolbarLocked { .. })
    ));
    assert!(session.toggle_data_model().await);

    stub.gate.notify_one();
    timeout(Duration::from_secs(5), running)
        .await
        .expect("execute hung")
        .expect("task panicked")
        .expect("execute should succeed");

    assert!(!session.is_locked().await);
    assert_eq!(session.phase().await, SessionPhase::Executed);
    assert!(!stub.endpoints().contains(&"check_answer".to_string()));
    assert_eq!(session.query().await, "SELECT pg_sleep(10)");
}

/// Tests that key chords reach the session through the keyboard hub.
#[tokio::test]
async fn test_chord_dispatch() {
    let (base_url, stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let hub = KeyboardHub::new();
    let session = session(&base_url, "SELECT * FROM city", &events).with_keyboard(&hub);

    hub.press(KeyChord::plain('x').ctrl());
    assert!(session.pump_keys().await.is_empty());

    hub.press(KeyChord::plain('x').alt());
    let outcomes = session.pump_keys().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, Command::Execute);
    assert!(outcomes[0].1.is_ok());
    assert_eq!(stub.bodies("execute_query").len(), 1);
}

/// Tests that favorite toggling patches only the flag.
#[tokio::test]
async fn test_toggle_favorite() {
    let (base_url, stub) = spawn_stub().await;
    let events = EventBroadcaster::default();
    let session = session(&base_url, "", &events);

    assert!(session.toggle_favorite().await.expect("toggle"));
    assert!(!session.toggle_favorite().await.expect("toggle"));

    let patches = stub.bodies("patch_user_exercise");
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[0]["body"], json!({"favourite": true}));
    assert_eq!(patches[1]["body"], json!({"favourite": false}));
}

/// Tests that an unreachable service maps to a transport error.
#[tokio::test]
async fn test_transport_error_has_code_zero() {
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind")
        .local_addr()
        .expect("Failed to get local addr");
    // Listener dropped: nothing accepts on this port any more.
    let client = HttpExerciseClient::new(&format!("http://{addr}/api/")).expect("valid URL");

    let err = client
        .execute_query(TOPIC, 1, "SELECT 1")
        .await
        .expect_err("connection should fail");
    assert_eq!(err.code, 0);
    assert!(!err.message.is_empty());
}

// ============================================================================
// Workspace
// ============================================================================

async fn open_workspace(base_url: &str, exercise: u32) -> (Workspace, Arc<HttpExerciseClient>) {
    let http = Arc::new(HttpExerciseClient::new(base_url).expect("valid base URL"));
    let exercises = http.list_exercises(TOPIC).await.expect("exercise list");
    let records = http.user_exercises(TOPIC).await.expect("records");
    let record = http.user_exercise(TOPIC, exercise).await.ok();
    let client: Arc<dyn ExerciseClient> = http.clone();

    let workspace = Workspace::open(
        ExerciseRoute::new(TOPIC, exercise),
        client,
        settings(),
        TopicProgress::from_records(exercises, &records),
        record,
        KeyboardHub::new(),
        EventBroadcaster::default(),
    )
    .expect("workspace");
    (workspace, http)
}

/// Tests that the seed loaders populate the buffer, favorite flag and badges.
#[tokio::test]
async fn test_workspace_seeded_from_service() {
    let (base_url, _stub) = spawn_stub().await;
    let (workspace, _http) = open_workspace(&base_url, 2).await;

    let snap = workspace.session().snapshot().await;
    assert_eq!(snap.query, "SELECT * FROM saved_2");
    assert!(snap.favorite);
    assert_eq!(workspace.progress().state(1), ExerciseState::Default);
    assert_eq!(workspace.progress().state(2), ExerciseState::Correct);
    assert_eq!(workspace.previous_route(), Some(ExerciseRoute::new(TOPIC, 1)));
    assert_eq!(workspace.next_route(), Some(ExerciseRoute::new(TOPIC, 3)));
}

/// Tests that navigating saves the old buffer and loads the next record.
#[tokio::test]
async fn test_workspace_navigation() {
    let (base_url, stub) = spawn_stub().await;
    let (mut workspace, http) = open_workspace(&base_url, 1).await;
    workspace.session().set_query("SELECT 42").await;

    let record = http.user_exercise(TOPIC, 2).await.ok();
    workspace.navigate(2, record).await.expect("navigate");

    let snap = workspace.session().snapshot().await;
    assert_eq!(snap.route, ExerciseRoute::new(TOPIC, 2));
    assert_eq!(snap.phase, SessionPhase::New);
    assert_eq!(snap.query, "SELECT * FROM saved_2");

    let saved = wait_until(|| async {
        stub.bodies("patch_user_exercise")
            .iter()
            .any(|p| p["body"] == json!({"buffer_save": "SELECT 42"}) && p["params"]["enumber"] == "1")
    })
    .await;
    assert!(saved, "old buffer was not saved");

    let err = workspace.navigate(7, None).await.expect_err("no exercise 7");
    assert!(matches!(err, SessionError::UnknownExercise { exercise: 7, .. }));
}

/// Tests that solving the last open exercise celebrates exactly once.
#[tokio::test]
async fn test_topic_completion_celebrates_once() {
    let (base_url, _stub) = spawn_stub().await;
    let (workspace, _http) = open_workspace(&base_url, 1).await;
    let mut rx = workspace.events().subscribe();
    let session = workspace.session();

    session.set_query("SELECT name FROM city").await;
    session.check().await.expect("check");
    session.check().await.expect("check again");

    let celebrations = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Celebrate(p) if p.topic == TOPIC))
        .count();
    assert_eq!(celebrations, 1);
    assert_eq!(session.badge(1).await, ExerciseState::Correct);
}
