use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use port_watch_rs::notify::{
    deliver_with_retry, DeliveryOutcome, Notifier, NotifierConfig, RetryPolicy, TelegramNotifier,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

const TOKEN: &str = "TEST-TOKEN";

#[derive(Clone)]
struct BotApi {
    fail_first: usize,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn send_message(State(api): State<BotApi>, Json(body): Json<Value>) -> StatusCode {
    let n = api.hits.fetch_add(1, Ordering::SeqCst) + 1;
    api.bodies.lock().unwrap().push(body);
    if n <= api.fail_first {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

async fn spawn_bot_api(fail_first: usize) -> (String, BotApi) {
    let api = BotApi {
        fail_first,
        hits: Arc::new(AtomicUsize::new(0)),
        bodies: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route(&format!("/bot{TOKEN}/sendMessage"), post(send_message))
        .with_state(api.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), api)
}

fn notifier(api_base: &str, token: &str) -> TelegramNotifier {
    let mut cfg = NotifierConfig::new(token, "-100200300");
    cfg.api_base = api_base.to_string();
    cfg.http_timeout = Duration::from_secs(2);
    TelegramNotifier::new(cfg).unwrap()
}

fn quick() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn posts_chat_id_and_text() {
    let (base, api) = spawn_bot_api(0).await;
    let n = notifier(&base, TOKEN);

    n.send("Port changes detected on h").await.expect("delivered");

    let bodies = api.bodies.lock().unwrap();
    assert_eq!(
        bodies.as_slice(),
        &[json!({"chat_id": "-100200300", "text": "Port changes detected on h"})]
    );
}

#[tokio::test]
async fn retries_server_errors() {
    let (base, api) = spawn_bot_api(2).await;
    let n = notifier(&base, TOKEN);

    let out = deliver_with_retry(&n, "msg", quick()).await;

    assert_eq!(out, DeliveryOutcome::Delivered { attempts: 3 });
    assert_eq!(api.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn gives_up_after_three_attempts() {
    let (base, api) = spawn_bot_api(usize::MAX).await;
    let n = notifier(&base, TOKEN);

    let out = deliver_with_retry(&n, "msg", quick()).await;

    assert_eq!(out, DeliveryOutcome::Failed { attempts: 3 });
    assert_eq!(api.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn wrong_token_is_an_error() {
    let (base, api) = spawn_bot_api(0).await;
    let n = notifier(&base, "WRONG");

    let err = n.send("msg").await.unwrap_err();
    assert!(err.to_string().contains("404"));
    assert_eq!(api.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_endpoint_fails_without_panicking() {
    let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = l.local_addr().unwrap();
    drop(l);
    let n = notifier(&format!("http://{addr}"), TOKEN);

    let out = deliver_with_retry(&n, "msg", quick()).await;
    assert!(!out.is_delivered());
}
