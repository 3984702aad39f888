//! HTTP client tests against local axum servers.

use axum::body::Body;
use axum::extract::{Path, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use taopulse_core::{
    Direction, LedgerGateway, LedgerMutator, MutationError, QueryKey, ScoreError, Scorer,
    SignalError, SignalItem, SignalSource, SignedScore, StakeAdjustment, UpstreamError,
};
use taopulse_providers::{
    ChutesClient, ChutesScorer, DaturaConfig, DaturaSignalSource, HttpLedgerGateway,
    HttpLedgerMutator,
};

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    addr
}

/// An address nothing listens on.
async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    listener.local_addr().expect("local addr")
}

fn auth(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// DATURA
// ============================================================================

#[tokio::test]
async fn test_datura_search_truncates_and_parses() {
    let app = Router::new().route(
        "/twitter",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            if auth(&headers) != "dt_token" {
                return (StatusCode::UNAUTHORIZED, "bad token").into_response();
            }
            let query = body["query"].as_str().unwrap_or_default().to_string();
            let tweets: Vec<Value> = (0..12)
                .map(|i| {
                    json!({
                        "text": format!("{query} #{i}"),
                        "created_at": "Tue Oct 14 09:21:07 +0000 2025",
                    })
                })
                .collect();
            Json(tweets).into_response()
        }),
    );
    let addr = serve(app).await;

    let source = DaturaSignalSource::new(
        DaturaConfig::new("dt_token").with_base_url(format!("http://{addr}/twitter")),
    );
    let items = source.search(18).await.expect("search succeeds");

    assert_eq!(items.len(), 10);
    assert_eq!(items[0].text, "Bittensor netuid 18 #0");
    assert!(items.iter().all(|i| i.created_at.is_some()));
}

#[tokio::test]
async fn test_datura_error_status() {
    let app = Router::new().route(
        "/twitter",
        post(|| async { (StatusCode::UNAUTHORIZED, "bad token") }),
    );
    let addr = serve(app).await;

    let source = DaturaSignalSource::new(
        DaturaConfig::new("wrong").with_base_url(format!("http://{addr}/twitter")),
    );
    match source.search(18).await {
        Err(SignalError::RequestFailed { status, message, .. }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "bad token");
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_datura_malformed_body() {
    let app = Router::new().route("/twitter", post(|| async { Json(json!({"oops": 1})) }));
    let addr = serve(app).await;

    let source = DaturaSignalSource::new(
        DaturaConfig::new("t").with_base_url(format!("http://{addr}/twitter")),
    );
    assert!(matches!(
        source.search(18).await,
        Err(SignalError::InvalidResponse { .. })
    ));
}

// ============================================================================
// CHUTES
// ============================================================================

#[tokio::test]
async fn test_chutes_scores_completion() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            assert_eq!(auth(&headers), "Bearer cpk_token");
            let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
            let content = if prompt.contains("- looks weak") {
                "<sentiment_breakdown>meh</sentiment_breakdown>\n<score>\n-35\n</score>"
            } else {
                "no score here"
            };
            Json(json!({
                "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
            }))
        }),
    );
    let addr = serve(app).await;

    let client = ChutesClient::new("cpk_token", 600, Duration::from_secs(5))
        .with_base_url(format!("http://{addr}/v1"));
    let scorer = ChutesScorer::new(client, "test-model");

    let items = vec![SignalItem::new("@someone looks weak https://t.co/abc")];
    assert_eq!(scorer.score(&items).await, Ok(SignedScore::new(-35.0)));

    let other = vec![SignalItem::new("something else")];
    assert!(matches!(
        scorer.score(&other).await,
        Err(ScoreError::Unparseable { .. })
    ));
}

#[tokio::test]
async fn test_chutes_rate_limited() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", "2")],
                "slow down",
            )
        }),
    );
    let addr = serve(app).await;

    let client = ChutesClient::new("t", 600, Duration::from_secs(5))
        .with_base_url(format!("http://{addr}/v1"));
    let scorer = ChutesScorer::new(client, "test-model");

    assert_eq!(
        scorer.score(&[SignalItem::new("gm")]).await,
        Err(ScoreError::RateLimited {
            provider: "chutes".to_string(),
            retry_after_ms: 2000,
        })
    );
}

#[tokio::test]
async fn test_chutes_api_error_message() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": {"message": "unknown model"}})),
            )
        }),
    );
    let addr = serve(app).await;

    let client = ChutesClient::new("t", 600, Duration::from_secs(5))
        .with_base_url(format!("http://{addr}/v1"));
    let scorer = ChutesScorer::new(client, "nope");

    match scorer.score(&[SignalItem::new("gm")]).await {
        Err(ScoreError::RequestFailed { status, message, .. }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "unknown model");
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}

// ============================================================================
// LEDGER SIDECAR
// ============================================================================

fn ledger_app() -> Router {
    Router::new()
        .route(
            "/subnets/:netuid/dividends",
            get(
                |Path(netuid): Path<u16>, Query(params): Query<HashMap<String, String>>| async move {
                    match params.get("hotkey").map(String::as_str) {
                        Some("unknown") => StatusCode::NOT_FOUND.into_response(),
                        Some("stalled") => {
                            // Headers and a partial body now, the rest too late.
                            let chunks = stream::once(async {
                                Ok::<_, std::io::Error>("{\"dividends\": {")
                            })
                            .chain(stream::once(async {
                                tokio::time::sleep(Duration::from_millis(500)).await;
                                Ok("\"stalled\": 1}}")
                            }));
                            (
                                [(header::CONTENT_TYPE, "application/json")],
                                Body::from_stream(chunks),
                            )
                                .into_response()
                        }
                        Some("slow") => {
                            tokio::time::sleep(Duration::from_millis(500)).await;
                            Json(json!({"dividends": {"slow": 1}})).into_response()
                        }
                        Some(hotkey) => {
                            let mut dividends = serde_json::Map::new();
                            dividends.insert(hotkey.to_string(), json!(1000 + u64::from(netuid)));
                            Json(json!({ "dividends": dividends })).into_response()
                        }
                        None if netuid == 99 => {
                            (StatusCode::INTERNAL_SERVER_ERROR, "chain down").into_response()
                        }
                        None => Json(json!({"dividends": {"A": 1, "B": 2}})).into_response(),
                    }
                },
            ),
        )
        .route(
            "/stake",
            post(|Json(body): Json<Value>| async move {
                if body["amount"].as_f64().unwrap_or(0.0) > 1.0 {
                    return (StatusCode::BAD_REQUEST, "amount too large").into_response();
                }
                assert!(body["direction"] == "increase" || body["direction"] == "decrease");
                Json(json!({"tx_hash": format!("0x{}", body["netuid"])})).into_response()
            }),
        )
}

#[tokio::test]
async fn test_ledger_gateway_reads() {
    let addr = serve(ledger_app()).await;
    let gateway = HttpLedgerGateway::new(format!("http://{addr}"), Duration::from_secs(5));

    let value = gateway
        .fetch_value(&QueryKey::account(18, "A"))
        .await
        .expect("read succeeds");
    assert_eq!(value.amount(18, "A"), Some(1018));

    let all = gateway
        .fetch_value(&QueryKey::subnet(7))
        .await
        .expect("read succeeds");
    assert_eq!(all.total(), 3);
    assert_eq!(all.amount(7, "B"), Some(2));
}

#[tokio::test]
async fn test_ledger_gateway_unknown_account_is_zero() {
    let addr = serve(ledger_app()).await;
    let gateway = HttpLedgerGateway::new(format!("http://{addr}"), Duration::from_secs(5));

    let value = gateway
        .fetch_value(&QueryKey::account(18, "unknown"))
        .await
        .expect("unknown account is not an error");
    assert_eq!(value.amount(18, "unknown"), Some(0));
}

#[tokio::test]
async fn test_ledger_gateway_failures() {
    let addr = serve(ledger_app()).await;
    let gateway = HttpLedgerGateway::new(format!("http://{addr}"), Duration::from_millis(50));

    let server_error = gateway.fetch_value(&QueryKey::subnet(99)).await;
    assert!(matches!(server_error, Err(UpstreamError::Unavailable { .. })));

    let timeout = gateway
        .fetch_value(&QueryKey::account(18, "slow"))
        .await
        .expect_err("should time out");
    assert!(timeout.is_timeout());

    let stalled_body = gateway
        .fetch_value(&QueryKey::account(18, "stalled"))
        .await
        .expect_err("body read should time out");
    assert!(
        matches!(stalled_body, UpstreamError::Timeout { .. }),
        "expected Timeout, got {stalled_body:?}"
    );

    let refused = HttpLedgerGateway::new(
        format!("http://{}", closed_addr().await),
        Duration::from_secs(1),
    )
    .fetch_value(&QueryKey::subnet(1))
    .await;
    assert!(matches!(refused, Err(UpstreamError::Unavailable { .. })));
}

#[tokio::test]
async fn test_ledger_mutator() {
    let addr = serve(ledger_app()).await;
    let mutator = HttpLedgerMutator::new(format!("http://{addr}"), Duration::from_secs(5));

    let ok = StakeAdjustment {
        subnet_id: 18,
        account: "A".to_string(),
        direction: Direction::Decrease,
        amount: 0.05,
    };
    let result = mutator.adjust_stake(&ok).await.expect("accepted");
    assert_eq!(result.tx_ref.as_deref(), Some("0x18"));
    assert_eq!(result.direction, Direction::Decrease);

    let too_big = StakeAdjustment {
        amount: 5.0,
        ..ok
    };
    match mutator.adjust_stake(&too_big).await {
        Err(MutationError::Rejected { reason }) => assert!(reason.contains("amount too large")),
        other => panic!("expected Rejected, got {other:?}"),
    }
}
