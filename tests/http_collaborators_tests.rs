//! Wire-level tests for the HTTP collaborators using wiremock

use std::sync::Arc;
use std::time::Duration;

use restock::config::TelegramConfig;
use restock::currency::{CurrencyConverter, CurrencyError, HttpRateSource};
use restock::notifications::{Channel, NotifierError, TelegramChannel, WebhookChannel};
use restock::sources::{JsonFeedSource, NvidiaFeSource, ProductSource, SourceError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn converter(server: &MockServer) -> CurrencyConverter {
    let source = HttpRateSource::new(server.uri(), TIMEOUT).unwrap();
    CurrencyConverter::new(Arc::new(source))
}

#[tokio::test]
async fn currency_rate_is_fetched_once_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/currencies/eur/usd.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"date": "2021-05-22", "usd": 1.25})),
        )
        .expect(1)
        .mount(&server)
        .await;
    let converter = converter(&server);

    assert_eq!(converter.convert(100.0, "EUR", "USD").await.unwrap(), 125.0);
    assert_eq!(converter.convert(8.0, "eur", "usd").await.unwrap(), 10.0);
}

#[tokio::test]
async fn currency_fetch_failure_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/currencies/chf/usd.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/currencies/chf/usd.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"date": "2021-05-22", "usd": 1.1})),
        )
        .mount(&server)
        .await;
    let converter = converter(&server);

    let err = converter.convert(10.0, "CHF", "USD").await.unwrap_err();
    assert!(matches!(err, CurrencyError::RateUnavailable { .. }));
    assert_eq!(converter.cached_pairs(), 0);

    let converted = converter.convert(10.0, "CHF", "USD").await.unwrap();
    assert!((converted - 11.0).abs() < 1e-9);
    assert_eq!(converter.cached_pairs(), 1);
}

#[tokio::test]
async fn currency_identity_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    assert_eq!(converter(&server).convert(10.0, "EUR", "EUR").await.unwrap(), 10.0);
}

fn telegram(server: &MockServer) -> TelegramChannel {
    let config = TelegramConfig {
        token: "123:secret".to_string(),
        chat_id: Some(42),
        channel_name: None,
        enable_replies: true,
        api_base: server.uri(),
    };
    TelegramChannel::new(&config, TIMEOUT).unwrap()
}

#[tokio::test]
async fn telegram_sends_replies_and_deletes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:secret/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": 42,
            "text": "RTX 3080 is back",
            "parse_mode": "Markdown",
            "disable_web_page_preview": true
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 7}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:secret/sendMessage"))
        .and(body_partial_json(json!({"reply_to_message_id": 7})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 8}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:secret/deleteMessage"))
        .and(body_partial_json(json!({"chat_id": 42, "message_id": 8})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
        .expect(1)
        .mount(&server)
        .await;
    let channel = telegram(&server);

    let sent = channel.send_message("RTX 3080 is back").await.unwrap();
    assert_eq!(sent, "7");
    let reply = channel.reply_to(&sent, "And it's gone (5m0s)").await.unwrap();
    assert_eq!(reply, "8");
    channel.delete_message(&reply).await.unwrap();
}

#[tokio::test]
async fn telegram_api_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let err = telegram(&server).send_message("hello").await.unwrap_err();

    match err {
        NotifierError::Http { status, body, .. } => {
            assert_eq!(status, 400);
            assert_eq!(body, "Bad Request: chat not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn telegram_requires_a_chat() {
    let config = TelegramConfig {
        token: "123:secret".to_string(),
        chat_id: None,
        channel_name: None,
        enable_replies: true,
        api_base: "https://api.telegram.org".to_string(),
    };
    assert!(matches!(
        TelegramChannel::new(&config, TIMEOUT),
        Err(NotifierError::Configuration { .. })
    ));
}

#[tokio::test]
async fn webhook_posts_replies_and_deletes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/restock/messages"))
        .and(body_partial_json(json!({"text": "in stock", "reply_to": null})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "abc"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hooks/restock/messages"))
        .and(body_partial_json(json!({"reply_to": "abc"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 99})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/hooks/restock/messages/99"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let channel = WebhookChannel::new(&format!("{}/hooks/restock/", server.uri()), TIMEOUT).unwrap();

    let sent = channel.send_message("in stock").await.unwrap();
    assert_eq!(sent, "abc");
    let reply = channel.reply_to(&sent, "gone").await.unwrap();
    assert_eq!(reply, "99");
    channel.delete_message(&reply).await.unwrap();
}

#[tokio::test]
async fn webhook_rejects_non_http_urls() {
    assert!(WebhookChannel::new("ftp://example.com/hook", TIMEOUT).is_err());
    assert!(WebhookChannel::new("not a url", TIMEOUT).is_err());
}

#[tokio::test]
async fn json_feed_reports_observations_for_its_shop() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feeds/gpus.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "name": "RTX 3080",
                "url": "https://x/1",
                "price": 699.99,
                "price_currency": "USD",
                "available": true
            },
            {"name": "RTX 3070", "url": "https://x/2", "available": false}
        ])))
        .mount(&server)
        .await;
    let source = JsonFeedSource::new(format!("{}/feeds/gpus.json", server.uri()), TIMEOUT).unwrap();

    assert_eq!(source.shop_name().unwrap(), "127.0.0.1");
    let observations = source.parse().await.unwrap();
    assert_eq!(observations.len(), 2);
    assert_eq!(observations[0].price, 699.99);
    assert!(!observations[1].available);
    assert_eq!(observations[1].price_currency, "");
}

#[tokio::test]
async fn json_feed_http_error_is_a_source_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let source = JsonFeedSource::new(format!("{}/feed", server.uri()), TIMEOUT).unwrap();

    assert!(matches!(
        source.parse().await,
        Err(SourceError::Http { status: 502, .. })
    ));
}

#[tokio::test]
async fn nvidia_inventory_maps_listings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/partner/v1/feinventory"))
        .and(query_param("skus", "NVGFT080"))
        .and(query_param("locale", "fr-fr"))
        .and(header("user-agent", "Mozilla/5.0 test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "listMap": [{"is_active": "true", "price": "719.00", "fe_sku": "NVGFT080_FR"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let source = NvidiaFeSource::new(
        "fr",
        &["RTX 3080".to_string()],
        "Mozilla/5.0 test",
        &server.uri(),
        TIMEOUT,
    )
    .unwrap();

    assert_eq!(source.shop_name().unwrap(), "nvidia.com/fr-fr/shop");
    let observations = source.parse().await.unwrap();

    assert_eq!(observations.len(), 1);
    let gpu = &observations[0];
    assert_eq!(gpu.name, "RTX 3080");
    assert_eq!(gpu.price, 719.0);
    assert_eq!(gpu.price_currency, "EUR");
    assert!(gpu.available);
    assert_eq!(gpu.url, source.product_url("RTX 3080"));
}

#[tokio::test]
async fn nvidia_applicative_failure_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .mount(&server)
        .await;
    let source = NvidiaFeSource::new(
        "es",
        &["RTX 3070".to_string()],
        "Mozilla/5.0 test",
        &server.uri(),
        TIMEOUT,
    )
    .unwrap();

    assert!(matches!(
        source.parse().await,
        Err(SourceError::MalformedResponse { .. })
    ));
}
