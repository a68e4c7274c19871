//! End-to-end tests through the HTTP router, with the remote scorer mocked

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::tempdir;
use tower::util::ServiceExt; // for `oneshot`
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use speech_grading_gateway::db::SqliteStore;
use speech_grading_gateway::recordings::RecordingArchive;
use speech_grading_gateway::scorer::{Endpoints, HttpScoringClient};
use speech_grading_gateway::{AppState, GradingGateway, build_router};

const HELLO_WORLD_KEY: &str = "4de436dca1ae3511206f848b697f0b5657f000d11bb40c23b7688d3562bfa06e";

async fn setup_state(server: &MockServer) -> (AppState, SqliteStore) {
    let store = SqliteStore::in_memory().await.unwrap();
    let endpoints = Endpoints {
        scripted: Some(format!("{}/scripted", server.uri())),
        unscripted: Some(format!("{}/unscripted", server.uri())),
        pronunciation: Some(format!("{}/pronunciation", server.uri())),
    };
    let client = HttpScoringClient::new(reqwest::Client::new(), endpoints, "test-key", false);
    let gateway = GradingGateway::new(Arc::new(store.clone()), Arc::new(client));
    (AppState::new(gateway, "lms.example.org"), store)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn hello_world_submission() -> Value {
    json!({
        "mode": "scripted",
        "audio_base64": "QUJD",
        "expected_text": "hello world",
        "user_id": "42"
    })
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let server = MockServer::start().await;
    let (state, _) = setup_state(&server).await;
    let app = build_router(Arc::new(state));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn identical_submissions_call_the_scorer_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scripted/us"))
        .and(header("x-user-id", "lms.example.org-42"))
        .and(header("lc-custom-moodle-instance-hostname", "lms.example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"overall_score": 92}"#))
        .expect(1)
        .mount(&server)
        .await;

    let (state, store) = setup_state(&server).await;
    let app = build_router(Arc::new(state));

    let first = app
        .clone()
        .oneshot(post_json("/api/score", hello_world_submission()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = extract_json(first.into_body()).await;
    assert_eq!(first["cache_key"], HELLO_WORLD_KEY);
    assert_eq!(first["cached"], false);
    assert_eq!(first["result"], json!({"overall_score": 92}));

    let second = app
        .oneshot(post_json("/api/score", hello_world_submission()))
        .await
        .unwrap();
    let second = extract_json(second.into_body()).await;
    assert_eq!(second["cached"], true);
    assert_eq!(second["result"], json!({"overall_score": 92}));

    assert_eq!(store.row_count().await.unwrap(), 1);
}

#[tokio::test]
async fn different_audio_is_scored_separately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scripted/us"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"overall_score": 60}"#))
        .expect(2)
        .mount(&server)
        .await;

    let (state, store) = setup_state(&server).await;
    let app = build_router(Arc::new(state));

    let mut other = hello_world_submission();
    other["audio_base64"] = json!("REVG");

    let a = extract_json(
        app.clone()
            .oneshot(post_json("/api/score", hello_world_submission()))
            .await
            .unwrap()
            .into_body(),
    )
    .await;
    let b = extract_json(
        app.oneshot(post_json("/api/score", other))
            .await
            .unwrap()
            .into_body(),
    )
    .await;

    assert_ne!(a["cache_key"], b["cache_key"]);
    assert_eq!(store.row_count().await.unwrap(), 2);
}

#[tokio::test]
async fn rejected_scoring_is_reported_and_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string(r#"{"detail": "bad audio"}"#))
        .mount(&server)
        .await;

    let (state, store) = setup_state(&server).await;
    let app = build_router(Arc::new(state));

    let response = app
        .oneshot(post_json("/api/score", hello_world_submission()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "scoring_rejected");
    assert!(body["message"].as_str().unwrap().contains("bad audio"));
    assert_eq!(store.row_count().await.unwrap(), 0);
}

#[tokio::test]
async fn non_json_scorer_body_is_a_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let (state, _) = setup_state(&server).await;
    let app = build_router(Arc::new(state));

    let response = app
        .oneshot(post_json("/api/score", hello_world_submission()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "scoring_unavailable");
}

#[tokio::test]
async fn invalid_submission_never_reaches_the_scorer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (state, _) = setup_state(&server).await;
    let app = build_router(Arc::new(state));

    let mut missing_text = hello_world_submission();
    missing_text.as_object_mut().unwrap().remove("expected_text");
    let response = app
        .clone()
        .oneshot(post_json("/api/score", missing_text))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut bad_audio = hello_world_submission();
    bad_audio["audio_base64"] = json!("%%%");
    let response = app
        .oneshot(post_json("/api/score", bad_audio))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_submission_is_a_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (state, _) = setup_state(&server).await;
    let app = build_router(Arc::new(state));

    let mut bad_accent = hello_world_submission();
    bad_accent["accent"] = json!("u/k");
    let mut unknown_mode = hello_world_submission();
    unknown_mode["mode"] = json!("freestyle");
    let mut no_audio = hello_world_submission();
    no_audio.as_object_mut().unwrap().remove("audio_base64");

    for submission in [bad_accent, unknown_mode, no_audio] {
        let response = app
            .clone()
            .oneshot(post_json("/api/score", submission))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = extract_json(response.into_body()).await;
        assert_eq!(body["error"], "invalid_request");
    }

    let response = app
        .oneshot(post_json("/api/grade", json!({"user_id": "1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn grade_of_scripted_question_without_phrase_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"overall_score": 50}"#))
        .expect(0)
        .mount(&server)
        .await;

    let (state, store) = setup_state(&server).await;
    let app = build_router(Arc::new(state));

    let request = json!({
        "question": {"mode": "scripted"},
        "user_id": "1",
        "recordings": ["QUJD"]
    });
    let response = app.oneshot(post_json("/api/grade", request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.row_count().await.unwrap(), 0);
}

#[tokio::test]
async fn grade_endpoint_averages_recordings_and_renders_feedback() {
    let server = MockServer::start().await;
    let body = json!({
        "overall": {"english_proficiency_scores": {"mock_ielts": {"prediction": 6.0}}},
        "pronunciation": {"words": [
            {"word_text": "hello", "word_score": 80,
             "phonemes": [{"ipa_label": "h", "phoneme_score": 80}]}
        ]},
        "grammar": {"english_proficiency_scores": {"mock_ielts": {"prediction": 5.5}}},
        "fluency": {"metrics": {"speech_rate": 100, "number_of_pauses": 1, "length_of_run": 3}}
    });
    Mock::given(method("POST"))
        .and(path("/unscripted/uk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let archive = Arc::new(RecordingArchive::open(dir.path()).await.unwrap());
    let (state, _) = setup_state(&server).await;
    let app = build_router(Arc::new(state.with_archive(archive.clone())));

    let request = json!({
        "question": {
            "id": 11,
            "mode": "unscripted",
            "accent": "uk",
            "context_question": "Describe your home town"
        },
        "user_id": "42",
        // the repeated recording is served from the cache
        "recordings": ["QUJD", "REVG", "QUJD"]
    });
    let response = app.oneshot(post_json("/api/grade", request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let graded = extract_json(response.into_body()).await;
    assert!((graded["fraction"].as_f64().unwrap() - 0.6).abs() < 1e-9);
    assert_eq!(graded["state"], "gradedpartial");
    let html = graded["feedback_html"].as_str().unwrap();
    assert!(html.contains("Overall Score: 6"));
    assert!(html.contains("<th scope=\"row\">grammar</th><td>5.5</td>"));
    assert!(html.contains("Fluency feedback"));

    let kept = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(kept, 2);
}

#[tokio::test]
async fn grade_without_recordings_is_rejected() {
    let server = MockServer::start().await;
    let (state, _) = setup_state(&server).await;
    let app = build_router(Arc::new(state));

    let request = json!({
        "question": {"mode": "scripted", "speech_phrase": "hello"},
        "user_id": "1",
        "recordings": []
    });
    let response = app.oneshot(post_json("/api/grade", request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_endpoint_exposes_cache_counters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"overall_score": 50}"#))
        .mount(&server)
        .await;
    let (state, _) = setup_state(&server).await;
    let app = build_router(Arc::new(state));

    app.clone()
        .oneshot(post_json("/api/score", hello_world_submission()))
        .await
        .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("speech_gateway_cache_misses_total"));
}
