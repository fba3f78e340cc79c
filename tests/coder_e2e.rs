use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use consult_coder::gateway::anthropic::AnthropicAdapter;
use consult_coder::gateway::{GatewayConfig, ProviderGateway};
use consult_coder::{Codeframe, CoderConfig, CodingRequest, ConsultationCoder};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bus_lane_codeframe() -> Codeframe {
    let mut service = BTreeMap::new();
    service.insert("004".to_string(), "More reliable services".to_string());
    service.insert("005".to_string(), "Quicker journeys".to_string());
    let mut modal = BTreeMap::new();
    modal.insert("050".to_string(), "Encourages bus use over driving".to_string());
    let mut categories = BTreeMap::new();
    categories.insert("service_quality".to_string(), service);
    categories.insert("modal_shift".to_string(), modal);
    Codeframe::from_categories(categories).unwrap()
}

fn coder_for(server: &MockServer) -> ConsultationCoder {
    let adapter =
        AnthropicAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5)).unwrap();
    let gateway = ProviderGateway::with_config(
        adapter,
        GatewayConfig {
            max_retries: 0,
            retry_base_delay: Duration::from_millis(0),
        },
    );
    ConsultationCoder::new(Arc::new(gateway), bus_lane_codeframe(), CoderConfig::default())
}

fn model_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn",
        "usage": { "input_tokens": 100, "output_tokens": 50 }
    }))
}

const WELL_FORMED_REPLY: &str = r#"{
    "codes": ["004", "050"],
    "confidence": { "004": 0.95, "050": 0.90 },
    "explanation": {
        "004": "Mentions reliability",
        "050": "Mentions switching from driving"
    },
    "relevant_quotes": {
        "004": "quicker and more reliable",
        "050": "use the bus instead of driving"
    },
    "error": null
}"#;

#[tokio::test]
async fn codes_a_response_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(model_reply(WELL_FORMED_REPLY))
        .mount(&server)
        .await;

    let coder = coder_for(&server);
    let result = coder
        .code_response(
            "What do you think of the bus lane?",
            "it'll make bus journeys quicker and more reliable, and encourage more people to use the bus instead of driving",
        )
        .await;

    assert!(!result.is_error());
    assert_eq!(result.codes, vec!["004", "050"]);
    assert_eq!(result.confidence.get("004"), Some(&0.95));
    assert_eq!(
        result.relevant_quotes.get("050").map(String::as_str),
        Some("use the bus instead of driving")
    );
}

#[tokio::test]
async fn recovers_json_wrapped_in_prose() {
    let server = MockServer::start().await;
    let wrapped = format!("Here is my analysis:\n{WELL_FORMED_REPLY}\nLet me know if you need more.");
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(model_reply(&wrapped))
        .mount(&server)
        .await;

    let coder = coder_for(&server);
    let result = coder.code_response("q", "the bus lane is great").await;

    assert!(!result.is_error());
    assert_eq!(result.codes, vec!["004", "050"]);
}

#[tokio::test]
async fn drops_codes_not_in_the_codeframe() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(model_reply(
            r#"{
                "codes": ["004", "999"],
                "confidence": { "004": 0.9, "999": 0.8 },
                "explanation": { "004": "reliability", "999": "invented" },
                "relevant_quotes": { "004": "more reliable", "999": "nothing" },
                "error": null
            }"#,
        ))
        .mount(&server)
        .await;

    let coder = coder_for(&server);
    let result = coder.code_response("q", "more reliable buses please").await;

    assert!(!result.is_error());
    assert_eq!(result.codes, vec!["004"]);
    assert!(!result.confidence.contains_key("999"));
    assert!(!result.explanation.contains_key("999"));
    assert!(!result.relevant_quotes.contains_key("999"));
}

#[tokio::test]
async fn unparseable_reply_becomes_error_result_with_raw_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(model_reply("I cannot assign any codes to this response."))
        .mount(&server)
        .await;

    let coder = coder_for(&server);
    let result = coder.code_response("q", "something unrelated").await;

    assert!(result.is_error());
    assert!(result.codes.is_empty());
    let message = result.error.unwrap();
    assert!(message.contains("I cannot assign any codes"));
}

#[tokio::test]
async fn transport_failure_becomes_error_result_not_panic() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "type": "error",
            "error": { "type": "api_error", "message": "internal server error" }
        })))
        .mount(&server)
        .await;

    let coder = coder_for(&server);
    let result = coder.code_response("q", "any response").await;

    assert!(result.is_error());
    assert!(result.codes.is_empty());
    assert!(result.error.unwrap().contains("provider_error"));
}

#[tokio::test]
async fn identical_pairs_hit_the_cache_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(model_reply(WELL_FORMED_REPLY))
        .mount(&server)
        .await;

    let coder = coder_for(&server);
    let first = coder.code_response("q", "same response text").await;
    let second = coder.code_response("q", "same response text").await;
    assert_eq!(first, second);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1, "second call must be served from cache");
}

#[tokio::test]
async fn failed_calls_are_retried_on_the_next_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "type": "error",
            "error": { "type": "api_error", "message": "internal server error" }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(model_reply(WELL_FORMED_REPLY))
        .mount(&server)
        .await;

    let coder = coder_for(&server);
    let first = coder.code_response("q", "r").await;
    assert!(first.is_error());

    // Error results are not cached, so the retry reaches the provider.
    let second = coder.code_response("q", "r").await;
    assert!(!second.is_error());
    assert_eq!(second.codes, vec!["004", "050"]);
}

#[tokio::test]
async fn batch_preserves_order_and_pairs_inputs_with_codings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(model_reply(WELL_FORMED_REPLY))
        .mount(&server)
        .await;

    let coder = coder_for(&server);
    let items = vec![
        CodingRequest::new("q1", "first response"),
        CodingRequest::new("q2", "second response"),
        CodingRequest::new("q1", "first response"),
    ];
    let out = coder.batch_code_responses(&items).await;

    assert_eq!(out.len(), 3);
    assert_eq!(out[0].question, "q1");
    assert_eq!(out[1].response, "second response");
    assert_eq!(out[2].coding, out[0].coding);

    // The duplicate third item is a cache hit.
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn cleans_response_text_before_prompting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(model_reply(WELL_FORMED_REPLY))
        .mount(&server)
        .await;

    let coder = coder_for(&server);
    coder
        .code_response("q", "buses   are [inaudible] great!!!")
        .await;

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let user_content = body["messages"][0]["content"].as_str().unwrap();
    assert!(user_content.contains("Response: buses are great!"));
    assert!(!user_content.contains("[inaudible]"));
}
