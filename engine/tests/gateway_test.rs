//! HTTP gateway tests against mock memory and completion services

use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use mnemo_engine::llm::openrouter::OpenRouterGateway;
use mnemo_engine::llm::{CompletionError, CompletionGateway};
use mnemo_engine::memory::{spawn_write, Mem0Gateway, MemoryError, MemoryGateway};
use mnemo_engine::secrets::SecretString;
use sdk::types::{ChatMessage, OwnerKind, Role};
use std::sync::Arc;

fn key() -> SecretString {
    SecretString::new("m0-test-key")
}

#[tokio::test]
async fn test_retrieve_reads_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/memories/"))
        .and(query_param("user_id", "alice"))
        .and(query_param("output_format", "v1.1"))
        .and(header("Authorization", "Token m0-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": "1", "memory": "likes green tea", "score": 0.9},
                {"id": "2", "memory": "lives in Osaka"},
                {"id": "3"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Mem0Gateway::new(server.uri());
    let memories = gateway
        .retrieve(OwnerKind::User, "alice", &key())
        .await
        .unwrap();

    assert_eq!(memories, vec!["likes green tea", "lives in Osaka"]);
}

#[tokio::test]
async fn test_retrieve_without_results_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/memories/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let gateway = Mem0Gateway::new(server.uri());
    let memories = gateway
        .retrieve(OwnerKind::Agent, "haruka", &key())
        .await
        .unwrap();
    assert!(memories.is_empty());
}

#[tokio::test]
async fn test_search_sends_query_and_partition() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/memories/search/"))
        .and(body_json(json!({"query": "tea", "agent_id": "haruka"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"memory": "served tea to a witness", "score": 0.7}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Mem0Gateway::new(server.uri());
    let hits = gateway
        .search("tea", OwnerKind::Agent, "haruka", &key())
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "served tea to a witness");
    assert_eq!(hits[0].raw["score"], json!(0.7));
}

#[tokio::test]
async fn test_memory_error_taxonomy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/memories/search/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "bad token"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/memories/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let gateway = Mem0Gateway::new(server.uri());

    assert!(matches!(
        gateway.search("x", OwnerKind::User, "alice", &key()).await,
        Err(MemoryError::AuthenticationFailed(_))
    ));
    assert!(matches!(
        gateway.retrieve(OwnerKind::User, "alice", &key()).await,
        Err(MemoryError::Upstream { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_missing_identity_makes_no_call() {
    let server = MockServer::start().await;
    let gateway = Mem0Gateway::new(server.uri());

    assert!(matches!(
        gateway.retrieve(OwnerKind::User, "", &key()).await,
        Err(MemoryError::MissingIdentity(OwnerKind::User))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_spawned_write_posts_and_swallows_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/memories/"))
        .and(body_json(json!({
            "messages": [{"role": "user", "content": "hi there"}],
            "agent_id": "haruka",
            "output_format": "v1.1"
        })))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let gateway: Arc<dyn MemoryGateway> = Arc::new(Mem0Gateway::new(server.uri()));
    let handle = spawn_write(
        gateway,
        vec![ChatMessage::user("hi there")],
        OwnerKind::Agent,
        "haruka".to_string(),
        key(),
    );

    // The task completes normally even though the write failed
    handle.await.unwrap();
}

fn completion_gateway(server: &MockServer) -> OpenRouterGateway {
    OpenRouterGateway::new(server.uri(), Duration::from_secs(5))
}

#[tokio::test]
async fn test_completion_request_shape_and_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_json(json!({
            "model": "gryphe/mythomax-l2-13b",
            "messages": [
                {"role": "system", "content": "be kind"},
                {"role": "user", "content": "hello"}
            ],
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "gen-1",
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = completion_gateway(&server)
        .complete(
            "gryphe/mythomax-l2-13b",
            &[ChatMessage::system("be kind"), ChatMessage::user("hello")],
            &SecretString::new("sk-test"),
        )
        .await
        .unwrap();

    assert_eq!(reply, ChatMessage::assistant("hi there"));
}

#[tokio::test]
async fn test_completion_defaults_missing_role() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": null}}]
        })))
        .mount(&server)
        .await;

    let reply = completion_gateway(&server)
        .complete("m", &[ChatMessage::user("hello")], &SecretString::new("sk-test"))
        .await
        .unwrap();

    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "");
}

#[tokio::test]
async fn test_completion_error_taxonomy() {
    let cases = [
        (
            ResponseTemplate::new(200).set_body_json(json!({"choices": []})),
            "empty",
        ),
        (
            ResponseTemplate::new(200).set_body_json(json!({"error": "overloaded"})),
            "malformed",
        ),
        (
            ResponseTemplate::new(401).set_body_json(json!({"error": "No auth credentials found"})),
            "auth",
        ),
        (ResponseTemplate::new(429).set_body_string("slow down"), "upstream"),
    ];

    for (template, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(template)
            .mount(&server)
            .await;

        let result = completion_gateway(&server)
            .complete("m", &[ChatMessage::user("hello")], &SecretString::new("sk-test"))
            .await;

        match (expected, result) {
            ("empty", Err(CompletionError::EmptyChoices)) => {}
            ("malformed", Err(CompletionError::Malformed(_))) => {}
            ("auth", Err(CompletionError::AuthenticationFailed(_))) => {}
            ("upstream", Err(CompletionError::Upstream { status: 429, .. })) => {}
            (expected, other) => panic!("expected {}, got {:?}", expected, other),
        }
    }
}

#[tokio::test]
async fn test_completion_refuses_empty_credential() {
    let server = MockServer::start().await;

    let result = completion_gateway(&server)
        .complete("m", &[ChatMessage::user("hello")], &SecretString::default())
        .await;

    assert!(matches!(result, Err(CompletionError::MissingCredential)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_completion_is_network_error() {
    let gateway = OpenRouterGateway::new("http://127.0.0.1:9", Duration::from_secs(2));
    let result = gateway
        .complete("m", &[ChatMessage::user("hello")], &SecretString::new("sk-test"))
        .await;

    assert!(matches!(result, Err(CompletionError::NetworkError(_))));
}
