use crate::state;
use crate::store::StoreStats;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderName, Method};
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};

mod stats;
mod tracking;

pub fn app(state: state::AppState) -> Router {
    let cors = state.config.cors;
    let router = Router::new()
        .route("/api/track-open", post(tracking::track_open))
        .route("/api/track-action", post(tracking::track_action))
        .route("/api/group-stats/{chat_instance}", get(stats::group_stats))
        .route("/api/all-groups", get(stats::all_groups))
        .route("/api/user-session/{user_id}", get(stats::user_session))
        .route("/health", get(health))
        .with_state(state);

    if cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([HeaderName::from_static("content-type")]),
        )
    } else {
        router
    }
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: &'static str,
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) timestamp: OffsetDateTime,
    pub(crate) stats: StoreStats,
}

pub(crate) async fn health(State(state): State<state::AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: OffsetDateTime::now_utc(),
        stats: state.store.stats(),
    })
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::config;
    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::http::StatusCode;
    use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN};
    use serde_json::Value as JsonValue;
    use serde_json::from_slice as json_from_slice;
    use serde_json::json;
    use tower::ServiceExt;

    const USER_42: &str = r#"{"id":42,"first_name":"A"}"#;

    fn now_timestamp() -> String {
        OffsetDateTime::now_utc().unix_timestamp().to_string()
    }

    fn json_post(uri: &str, body: JsonValue) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, JsonValue) {
        let response = router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if body.is_empty() {
            JsonValue::Null
        } else {
            json_from_slice(&body).unwrap_or(JsonValue::Null)
        };
        (status, json)
    }

    async fn track_open(router: &Router, init_data: &str) -> (StatusCode, JsonValue) {
        send(
            router,
            json_post("/api/track-open", json!({ "initData": init_data })),
        )
        .await
    }

    #[tokio::test]
    async fn app__should_report_health_with_store_stats() {
        // Given
        let state = state::AppState::new(config::AppConfig::default());
        let router = app(state);

        // When
        let (status, body) = send(&router, get_request("/health")).await;

        // Then
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["stats"]["totalGroups"], 0);
        assert_eq!(body["stats"]["totalSessions"], 0);
    }

    #[tokio::test]
    async fn track_open__should_record_group_usage() {
        // Given
        let state = state::AppState::new(config::AppConfig::default());
        let auth_date = now_timestamp();
        let init_data = state.verifier.sign(&[
            ("auth_date", auth_date.as_str()),
            ("user", USER_42),
            ("chat_instance", "g1"),
            ("chat_type", "supergroup"),
        ]);
        let router = app(state.clone());

        // When
        for _ in 0..3 {
            let (status, body) = track_open(&router, &init_data).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], true);
            assert_eq!(body["session"]["userId"], 42);
            assert_eq!(body["session"]["chatInstance"], "g1");
            assert_eq!(body["session"]["chatType"], "supergroup");
            assert_eq!(body["session"]["isFromGroup"], true);
        }

        // Then
        let (status, body) = send(&router, get_request("/api/group-stats/g1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalUsers"], 1);
        assert_eq!(body["totalOpens"], 3);
        assert_eq!(body["firstOpenedBy"], 42);
    }

    #[tokio::test]
    async fn track_open__should_reject_bad_signature() {
        // Given
        let state = state::AppState::new(config::AppConfig::default());
        let init_data = crate::auth::InitDataVerifier::new("other:token")
            .sign(&[("auth_date", now_timestamp().as_str()), ("user", USER_42)]);
        let router = app(state.clone());

        // When
        let (status, body) = track_open(&router, &init_data).await;

        // Then
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid init data");
        assert_eq!(state.store.stats().total_sessions, 0);
    }

    #[tokio::test]
    async fn track_open__should_reject_missing_hash() {
        let state = state::AppState::new(config::AppConfig::default());
        let router = app(state);

        let (status, _) = track_open(
            &router,
            "auth_date=1&user=%7B%22id%22%3A1%2C%22first_name%22%3A%22B%22%7D",
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn track_open__should_reject_stale_init_data_when_window_configured() {
        // Given
        let app_config = config::AppConfig {
            auth_max_age: Some(time::Duration::hours(1)),
            ..config::AppConfig::default()
        };
        let state = state::AppState::new(app_config);
        let init_data = state
            .verifier
            .sign(&[("auth_date", "1700000000"), ("user", USER_42)]);
        let router = app(state);

        // When
        let (status, _) = track_open(&router, &init_data).await;

        // Then
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn user_session__should_return_session_after_private_open() {
        // Given
        let state = state::AppState::new(config::AppConfig::default());
        let init_data = state.verifier.sign(&[
            ("auth_date", now_timestamp().as_str()),
            ("user", USER_42),
            ("start_param", "promo"),
        ]);
        let router = app(state);
        let (status, body) = track_open(&router, &init_data).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["isFromGroup"], false);

        // When
        let (status, body) = send(&router, get_request("/api/user-session/42")).await;

        // Then
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["userId"], 42);
        assert_eq!(body["chatInstance"], JsonValue::Null);
        assert_eq!(body["startParam"], "promo");
        assert_eq!(body["user"]["first_name"], "A");
        let (_, all) = send(&router, get_request("/api/all-groups")).await;
        assert_eq!(all["totalGroups"], 0);
    }

    #[tokio::test]
    async fn lookups__should_return_not_found_for_unknown_keys() {
        // Given
        let router = app(state::AppState::new(config::AppConfig::default()));

        // When
        let (group_status, group_body) =
            send(&router, get_request("/api/group-stats/missing")).await;
        let (session_status, _) = send(&router, get_request("/api/user-session/7")).await;
        let (bad_id_status, _) = send(&router, get_request("/api/user-session/abc")).await;

        // Then
        assert_eq!(group_status, StatusCode::NOT_FOUND);
        assert_eq!(group_body["error"], "group not found");
        assert_eq!(session_status, StatusCode::NOT_FOUND);
        assert_eq!(bad_id_status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn all_groups__should_list_most_active_first() {
        // Given
        let state = state::AppState::new(config::AppConfig::default());
        let auth_date = now_timestamp();
        let router = app(state.clone());
        for (chat_instance, opens) in [("a", 5), ("b", 2), ("c", 9)] {
            let init_data = state.verifier.sign(&[
                ("auth_date", auth_date.as_str()),
                ("user", USER_42),
                ("chat_instance", chat_instance),
            ]);
            for _ in 0..opens {
                let (status, _) = track_open(&router, &init_data).await;
                assert_eq!(status, StatusCode::OK);
            }
        }

        // When
        let (status, body) = send(&router, get_request("/api/all-groups")).await;

        // Then
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalGroups"], 3);
        let opens: Vec<u64> = body["groups"]
            .as_array()
            .expect("groups")
            .iter()
            .map(|group| group["totalOpens"].as_u64().expect("opens"))
            .collect();
        assert_eq!(opens, vec![9, 5, 2]);
    }

    #[tokio::test]
    async fn track_action__should_acknowledge_without_changing_stats() {
        // Given
        let state = state::AppState::new(config::AppConfig::default());
        let router = app(state.clone());

        // When
        let (status, body) = send(
            &router,
            json_post(
                "/api/track-action",
                json!({ "userId": 42, "action": "share_clicked", "data": { "button": "main" } }),
            ),
        )
        .await;

        // Then
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(state.store.stats().total_sessions, 0);
    }

    #[tokio::test]
    async fn track_action__should_acknowledge_blank_action() {
        let router = app(state::AppState::new(config::AppConfig::default()));

        let (status, body) = send(
            &router,
            json_post("/api/track-action", json!({ "userId": 42, "action": "  " })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn app__should_add_cors_headers_when_enabled() {
        // Given
        let app_config = config::AppConfig {
            cors: true,
            ..config::AppConfig::default()
        };
        let router = app(state::AppState::new(app_config));

        // When
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(ORIGIN, "https://miniapp.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(
            response
                .headers()
                .get(ACCESS_CONTROL_ALLOW_ORIGIN)
                .expect("cors header"),
            "*"
        );
    }
}
