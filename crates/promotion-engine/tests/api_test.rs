//! REST 接口测试
//!
//! 使用 tower::ServiceExt::oneshot 直接驱动路由，规则文档写在临时目录。

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use promotion_engine::{AppState, FileRuleSource, MetricsStore, RuleStore, routes};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

const RULES: &str = r#"
rules:
  - id: vip_weekend_bonus
    name: VIP Weekend Bonus
    description: Extra coins for active high spenders
    priority: 10
    conditions:
      - field: spendTier
        operator: equals
        value: high
      - field: daysSinceLastPurchase
        operator: lessThan
        value: 7
    reward:
      type: coins
      multiplier: 1.5
  - id: new_player_welcome
    name: New Player Welcome
    description: Starter pack
    priority: 5
    conditions:
      - field: level
        operator: lessThan
        value: 10
    reward:
      type: items
      items: [sword, shield, potion]
"#;

/// 临时规则文件，drop 时删除
struct RulesFile {
    path: PathBuf,
}

impl RulesFile {
    fn new(content: &str) -> Self {
        let path = std::env::temp_dir().join(format!("promotion-rules-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, content).unwrap();
        Self { path }
    }

    fn write(&self, content: &str) {
        std::fs::write(&self.path, content).unwrap();
    }
}

impl Drop for RulesFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn setup(content: &str) -> (Router, RulesFile, AppState) {
    let file = RulesFile::new(content);
    let state = AppState::new(
        RuleStore::new(),
        Arc::new(MetricsStore::new()),
        Arc::new(FileRuleSource::new(&file.path)),
    );
    state.loader.reload().await.unwrap();
    (routes::build_router(state.clone()), file, state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn parse(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

fn vip_player() -> Value {
    json!({
        "playerId": "player-123",
        "level": 25,
        "country": "US",
        "spendTier": "high",
        "daysSinceLastPurchase": 3
    })
}

#[tokio::test]
async fn test_evaluate_match_returns_200() {
    let (app, _file, _) = setup(RULES).await;

    let (status, body) = send(&app, "POST", "/api/promotion", Some(vip_player())).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse(&body);
    assert_eq!(json["promotion"]["id"], "vip_weekend_bonus");
    assert_eq!(json["promotion"]["reward"]["multiplier"], 1.5);
    assert_eq!(json["matchedRules"], json!(["vip_weekend_bonus"]));
    assert!(json["evaluationTimeMs"].is_number());
}

#[tokio::test]
async fn test_evaluate_no_match_returns_204() {
    let (app, _file, _) = setup(RULES).await;

    let mut player = vip_player();
    player["spendTier"] = json!("low");

    let (status, body) = send(&app, "POST", "/promotion", Some(player)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_evaluate_invalid_body_returns_400() {
    let (app, _file, state) = setup(RULES).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/promotion",
        Some(json!({
            "playerId": "",
            "level": 0,
            "country": "US",
            "spendTier": "platinum",
            "daysSinceLastPurchase": 3
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json = parse(&body);
    assert_eq!(json["error"], "Invalid request body");
    let fields: Vec<_> = json["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(fields, vec!["level", "playerId", "spendTier"]);

    // 校验失败的请求不进入评估
    let snapshot = state.metrics.snapshot(&state.store.snapshot());
    assert_eq!(snapshot.total_requests, 0);
}

#[tokio::test]
async fn test_evaluate_malformed_json_returns_400() {
    let (app, _file, _) = setup(RULES).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/promotion")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"playerId\": "))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(parse(&bytes)["details"][0]["field"], "body");
}

#[tokio::test]
async fn test_metrics_after_evaluations() {
    let (app, _file, _) = setup(RULES).await;

    send(&app, "POST", "/api/promotion", Some(vip_player())).await;
    let mut miss = vip_player();
    miss["daysSinceLastPurchase"] = json!(30);
    send(&app, "POST", "/api/promotion", Some(miss.clone())).await;
    send(&app, "POST", "/api/promotion", Some(miss)).await;

    let (status, body) = send(&app, "GET", "/api/metrics", None).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse(&body);
    assert_eq!(json["totalRequests"], 3);
    assert_eq!(json["successfulMatches"], 1);
    assert_eq!(json["missedMatches"], 2);
    assert_eq!(json["hitRate"], 0.333);
    assert_eq!(json["activeRules"], 2);
    assert!(json["uptime"].as_str().unwrap().ends_with('m'));
    assert!(json["rulesLastReloaded"].is_string());
}

#[tokio::test]
async fn test_metrics_reset() {
    let (app, _file, _) = setup(RULES).await;
    send(&app, "POST", "/promotion", Some(vip_player())).await;

    let (status, body) = send(&app, "POST", "/metrics/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse(&body);
    assert_eq!(json["totalRequests"], 0);
    assert_eq!(json["averageEvaluationTimeMs"], 0.0);
    // 重置指标不影响规则
    assert_eq!(json["activeRules"], 2);
}

#[tokio::test]
async fn test_reload_success() {
    let (app, file, _) = setup(RULES).await;

    file.write("rules: []\n");
    let (status, body) = send(&app, "POST", "/api/reload", None).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse(&body);
    assert_eq!(json["status"], "success");
    assert_eq!(json["rulesLoaded"], 0);
    assert!(json["reloadTime"].is_string());
    assert_eq!(json["validationErrors"], json!([]));
}

#[tokio::test]
async fn test_reload_validation_failure_keeps_rules() {
    let (app, file, _) = setup(RULES).await;

    file.write(&RULES.replace("    priority: 10\n", ""));
    let (status, body) = send(&app, "POST", "/api/reload", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let json = parse(&body);
    assert_eq!(json["status"], "error");
    assert_eq!(json["validationErrors"][0]["field"], "rules.0.priority");
    assert_eq!(json["validationErrors"][0]["message"], "Required");

    // 之前的规则仍然生效
    let (status, _) = send(&app, "POST", "/api/promotion", Some(vip_player())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_reload_parse_failure_returns_400() {
    let (app, file, _) = setup(RULES).await;

    file.write("rules:\n  - id: [broken\n");
    let (status, body) = send(&app, "POST", "/reload", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let json = parse(&body);
    let errors = json["validationErrors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0]["line"].is_number());
}

#[tokio::test]
async fn test_reload_missing_file_returns_500() {
    let (app, file, state) = setup(RULES).await;

    std::fs::remove_file(&file.path).unwrap();
    let (status, body) = send(&app, "POST", "/api/reload", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let json = parse(&body);
    assert_eq!(json["status"], "error");
    assert_eq!(json["validationErrors"], json!([{"field": "", "message": "Failed to reload rules"}]));
    assert_eq!(state.store.len(), 2);
}

#[tokio::test]
async fn test_health() {
    let (app, _file, _) = setup(RULES).await;

    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!({"status": "ok", "activeRules": 2}));
}
