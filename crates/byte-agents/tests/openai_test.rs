use byte_agents::{Chunk, InvocationError, ModelInvoker, OpenAiInvoker, ToolDefinition};
use byte_common::Turn;
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(events: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn delta(content: serde_json::Value) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "choices": [{ "index": 0, "delta": content, "finish_reason": null }]
    })
}

async fn collect(invoker: &OpenAiInvoker, functions: &[ToolDefinition]) -> Vec<Chunk> {
    let turns = vec![Turn::system("be nice"), Turn::user("hi")];
    let mut stream = invoker
        .invoke("gpt-4o-mini", &turns, functions)
        .await
        .expect("invoke should succeed");
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk.expect("chunk should parse"));
    }
    chunks
}

#[tokio::test]
async fn streams_text_deltas() {
    let server = MockServer::start().await;
    let body = sse(&[
        delta(json!({"role": "assistant", "content": ""})),
        delta(json!({"content": "Hello"})),
        delta(json!({"content": " there"})),
    ]);

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let invoker = OpenAiInvoker::new("test-key".to_string(), Some(server.uri()));
    let chunks = collect(&invoker, &[]).await;

    assert_eq!(
        chunks,
        vec![
            Chunk::TextDelta("Hello".into()),
            Chunk::TextDelta(" there".into()),
            Chunk::End,
        ]
    );
}

#[tokio::test]
async fn streams_function_call_fragments() {
    let server = MockServer::start().await;
    let body = sse(&[
        delta(json!({"function_call": {"name": "google_search", "arguments": ""}})),
        delta(json!({"function_call": {"arguments": "{\"search_term\":"}})),
        delta(json!({"function_call": {"arguments": "\"rust\"}"}})),
    ]);

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"functions": [{"name": "google_search"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let functions = vec![ToolDefinition {
        name: "google_search".into(),
        description: "search".into(),
        input_schema: json!({"type": "object"}),
    }];
    let invoker = OpenAiInvoker::new("test-key".to_string(), Some(server.uri()));
    let chunks = collect(&invoker, &functions).await;

    assert_eq!(
        chunks,
        vec![
            Chunk::ToolCallStart {
                name: "google_search".into()
            },
            Chunk::ToolCallArgs("{\"search_term\":".into()),
            Chunk::ToolCallArgs("\"rust\"}".into()),
            Chunk::End,
        ]
    );
}

#[tokio::test]
async fn rate_limit_error_carries_wait_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "message": "Rate limit reached for gpt-4o-mini. Please try again in 7s.",
                "type": "requests"
            }
        })))
        .mount(&server)
        .await;

    let invoker = OpenAiInvoker::new("test-key".to_string(), Some(server.uri()));
    let err = invoker
        .invoke("gpt-4o-mini", &[Turn::user("hi")], &[])
        .await
        .err()
        .expect("should fail");
    assert_eq!(err, InvocationError::RateLimited { wait_secs: 7 });
}

#[tokio::test]
async fn moderation_error_names_category() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Your request was flagged moderation category: harassment" }
        })))
        .mount(&server)
        .await;

    let invoker = OpenAiInvoker::new("test-key".to_string(), Some(server.uri()));
    let err = invoker
        .invoke("gpt-4o-mini", &[Turn::user("hi")], &[])
        .await
        .err()
        .expect("should fail");
    assert_eq!(
        err,
        InvocationError::Moderation {
            category: "harassment".into()
        }
    );
}

#[tokio::test]
async fn other_errors_are_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let invoker = OpenAiInvoker::new("test-key".to_string(), Some(server.uri()));
    let err = invoker
        .invoke("gpt-4o-mini", &[Turn::user("hi")], &[])
        .await
        .err()
        .expect("should fail");
    assert_eq!(
        err,
        InvocationError::Api {
            status: 503,
            message: "upstream unavailable".into()
        }
    );
}

#[tokio::test]
async fn in_stream_error_is_classified() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {}\n\ndata: {}\n\n",
        delta(json!({"content": "partial"})),
        json!({"error": {"message": "Rate limit reached. Try again in 2 seconds"}})
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let invoker = OpenAiInvoker::new("test-key".to_string(), Some(server.uri()));
    let mut stream = invoker
        .invoke("gpt-4o-mini", &[Turn::user("hi")], &[])
        .await
        .expect("invoke should succeed");

    assert_eq!(
        stream.next().await,
        Some(Ok(Chunk::TextDelta("partial".into())))
    );
    assert_eq!(
        stream.next().await,
        Some(Err(InvocationError::RateLimited { wait_secs: 2 }))
    );
}
