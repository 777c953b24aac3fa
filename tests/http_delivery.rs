//! Notifier deliveries against a local HTTP endpoint.

use flag_relay::changes::ChangeSet;
use flag_relay::error::DeliveryError;
use flag_relay::notifier::{self, HttpPoster, Notifier, NotifierFanout, sign_body};
use flag_relay::settings::{NotifierKind, NotifierSettings};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// One request as seen by the endpoint.
#[derive(Debug)]
struct Captured {
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Captured {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Serve every request with `status`, forwarding what was received.
async fn endpoint(status: u16) -> (String, mpsc::UnboundedReceiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/hook", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };

                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let headers: HashMap<String, String> = head
                    .lines()
                    .skip(1)
                    .filter_map(|line| line.split_once(':'))
                    .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
                    .collect();
                let length: usize = headers
                    .get("content-length")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);

                while buf.len() < header_end + length {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }

                let body = buf[header_end..].to_vec();
                let _ = tx.send(Captured { headers, body });

                let response = format!(
                    "HTTP/1.1 {} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (url, rx)
}

fn settings(kind: NotifierKind, url: &str) -> NotifierSettings {
    NotifierSettings {
        kind,
        url: url.to_string(),
        secret: None,
        headers: BTreeMap::new(),
        meta: BTreeMap::new(),
        timeout_ms: Some(2_000),
    }
}

fn sample_changes() -> ChangeSet {
    let mut changes = ChangeSet::new();
    changes.add("new-banner", json!({"variations": {"on": true}}));
    changes.delete("old-banner", json!({"variations": {"on": false}}));
    changes.update("checkout", json!({"disable": false}), json!({"disable": true}));
    changes
}

#[tokio::test]
async fn test_signed_webhook_delivery() {
    let (url, mut rx) = endpoint(200).await;
    let mut webhook = settings(NotifierKind::Webhook, &url);
    webhook.secret = Some("shared-secret".to_string());
    webhook.meta.insert("env".to_string(), "prod".to_string());
    webhook.headers.insert("X-Relay".to_string(), "1".to_string());

    let notifier = notifier::from_settings(&webhook, "team-a").unwrap();
    notifier.notify(&sample_changes()).await.unwrap();

    let request = rx.recv().await.unwrap();
    assert_eq!(request.headers["content-type"], "application/json");
    assert_eq!(request.headers["x-relay"], "1");
    assert_eq!(
        request.headers["x-hub-signature-256"],
        sign_body("shared-secret", &request.body).unwrap()
    );

    let body = request.json();
    assert_eq!(body["meta"]["flagset"], "team-a");
    assert_eq!(body["meta"]["env"], "prod");
    assert!(body["flags"]["added"]["new-banner"].is_object());
    assert_eq!(body["flags"]["updated"]["checkout"]["after"]["disable"], true);
}

#[tokio::test]
async fn test_unsigned_delivery_has_no_signature() {
    let (url, mut rx) = endpoint(204).await;
    let notifier = notifier::from_settings(&settings(NotifierKind::Webhook, &url), "default").unwrap();

    notifier.notify(&sample_changes()).await.unwrap();

    let request = rx.recv().await.unwrap();
    assert!(!request.headers.contains_key("x-hub-signature-256"));
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let (url, _rx) = endpoint(500).await;
    let notifier = notifier::from_settings(&settings(NotifierKind::Slack, &url), "default").unwrap();

    let result = notifier.notify(&sample_changes()).await;
    assert_eq!(result, Err(DeliveryError::Status { status: 500 }));
}

#[tokio::test]
async fn test_redirect_counts_as_delivered() {
    let (url, _rx) = endpoint(302).await;
    let poster = HttpPoster::builder().with_url(&url).build().unwrap();

    assert!(poster.post_json(&json!({})).await.is_ok());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/hook", listener.local_addr().unwrap());
    drop(listener);

    let poster = HttpPoster::builder()
        .with_url(&url)
        .with_timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let result = poster.post_json(&json!({})).await;
    assert!(matches!(result, Err(DeliveryError::Transport(_))));
}

#[tokio::test]
async fn test_chat_payloads_reach_their_endpoints() {
    let (slack_url, mut slack_rx) = endpoint(200).await;
    let (discord_url, mut discord_rx) = endpoint(200).await;
    let (teams_url, mut teams_rx) = endpoint(200).await;

    let fanout = NotifierFanout::new("team-a")
        .with_notifier(notifier::from_settings(&settings(NotifierKind::Slack, &slack_url), "team-a").unwrap())
        .with_notifier(notifier::from_settings(&settings(NotifierKind::Discord, &discord_url), "team-a").unwrap())
        .with_notifier(
            notifier::from_settings(&settings(NotifierKind::MicrosoftTeams, &teams_url), "team-a").unwrap(),
        );

    let report = fanout.notify(&sample_changes()).await;
    assert!(report.is_success());
    assert_eq!(report.invoked, 3);

    let slack = slack_rx.recv().await.unwrap().json();
    assert!(slack["text"].as_str().unwrap().contains("team-a"));
    assert_eq!(slack["attachments"].as_array().unwrap().len(), 3);

    let discord = discord_rx.recv().await.unwrap().json();
    assert_eq!(discord["embeds"].as_array().unwrap().len(), 3);

    let teams = teams_rx.recv().await.unwrap().json();
    assert_eq!(teams["@type"], "MessageCard");
}

#[tokio::test]
async fn test_failing_endpoint_does_not_block_others() {
    let (good_url, mut good_rx) = endpoint(200).await;
    let (bad_url, _bad_rx) = endpoint(503).await;

    let good: Arc<dyn Notifier> = notifier::from_settings(&settings(NotifierKind::Webhook, &good_url), "a").unwrap();
    let bad: Arc<dyn Notifier> = notifier::from_settings(&settings(NotifierKind::Discord, &bad_url), "a").unwrap();
    let fanout = NotifierFanout::new("a").with_notifier(bad).with_notifier(good);

    for _ in 0..3 {
        let report = fanout.notify(&sample_changes()).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].notifier, "discord");
        assert!(good_rx.recv().await.is_some());
    }
}
