//! Integration tests for the tool dispatcher
//!
//! Search providers are in-process fakes and the transform pipeline only has
//! its local preview tier, so these run offline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use pipeagent::llm::ToolCallRequest;
use pipeagent::sandbox::{GuestLimits, SandboxExecutor};
use pipeagent::tools::{
    ProviderError, SearchChain, SearchHit, SearchProvider, SearchResults, ToolDispatcher,
    ToolResult, TransformPipeline, TransformTier,
};

/// Provider with a fixed answer that records how it was called
struct FakeProvider {
    name: &'static str,
    hits: Option<Vec<SearchHit>>,
    calls: Arc<AtomicUsize>,
    limits: Arc<Mutex<Vec<usize>>>,
}

impl FakeProvider {
    fn answering(name: &'static str, count: usize) -> Self {
        let hits = (0..count)
            .map(|i| SearchHit {
                title: format!("{} {}", name, i),
                link: format!("https://{}.example/{}", name, i),
                snippet: format!("snippet {}", i),
            })
            .collect();
        Self {
            name,
            hits: Some(hits),
            calls: Arc::default(),
            limits: Arc::default(),
        }
    }

    fn failing(name: &'static str) -> Self {
        Self {
            hits: None,
            ..Self::answering(name, 0)
        }
    }
}

#[async_trait]
impl SearchProvider for FakeProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.limits.lock().unwrap().push(limit);
        match &self.hits {
            Some(hits) => Ok(hits.iter().take(limit).cloned().collect()),
            None => Err(ProviderError::Status {
                provider: self.name,
                status: 503,
            }),
        }
    }
}

fn dispatcher_with(search: SearchChain) -> ToolDispatcher {
    dispatcher_with_parts(search, TransformPipeline::new(reqwest::Client::new(), vec![]))
}

fn dispatcher_with_parts(search: SearchChain, transform: TransformPipeline) -> ToolDispatcher {
    let sandbox = SandboxExecutor::spawn_thread(GuestLimits::default(), Duration::from_secs(5)).unwrap();
    ToolDispatcher::new(search, transform, sandbox)
}

fn empty_dispatcher() -> ToolDispatcher {
    dispatcher_with(SearchChain::new(None, vec![]))
}

fn call(name: &str, args: &str) -> ToolCallRequest {
    ToolCallRequest::new("call_1", name, args)
}

fn error_of(result: &ToolResult) -> &str {
    match result {
        ToolResult::Failure { error } => error,
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_tool() {
    let result = empty_dispatcher().dispatch(&call("delete_everything", "{}")).await;
    assert_eq!(error_of(&result), "unknown tool: delete_everything");
}

#[tokio::test]
async fn test_malformed_arguments() {
    let dispatcher = empty_dispatcher();
    for args in ["{oops", "[1,2,3]", "42", "null", "\"query\""] {
        let result = dispatcher.dispatch(&call("search", args)).await;
        assert_eq!(error_of(&result), "invalid arguments", "args: {}", args);
    }
}

#[tokio::test]
async fn test_missing_or_mistyped_arguments() {
    let dispatcher = empty_dispatcher();

    let missing = dispatcher.dispatch(&call("search", r#"{"limit": 3}"#)).await;
    assert!(error_of(&missing).starts_with("invalid arguments: "));
    assert!(error_of(&missing).contains("query"));

    let mistyped = dispatcher.dispatch(&call("run_code", r#"{"code": 7}"#)).await;
    assert!(error_of(&mistyped).starts_with("invalid arguments: "));

    // Blank argument text is an empty object, so the required field is missing
    let blank = dispatcher.dispatch(&call("transform", "")).await;
    assert!(error_of(&blank).contains("data"));
}

/// dispatch resolves for every input, and every result survives a text round trip
#[tokio::test]
async fn test_dispatch_is_total() {
    let dispatcher = empty_dispatcher();
    let cases = [
        ("search", r#"{"query": "rust"}"#),
        ("search", r#"{"query": "rust", "limit": "lots"}"#),
        ("transform", r#"{"data": "short"}"#),
        ("transform", r#"{"workflow": null, "data": "x"}"#),
        ("run_code", r#"{"code": "throw 'boom'"}"#),
        ("run_code", r#"{"code": "return {a: [1, 2], b: undefined};"}"#),
        ("run_code", "}{"),
        ("", ""),
        ("SEARCH", r#"{"query": "case matters"}"#),
    ];

    for (name, args) in cases {
        let result = dispatcher.dispatch(&call(name, args)).await;
        let parsed = ToolResult::from_text(&result.to_text()).unwrap();
        assert_eq!(parsed, result, "tool {:?} args {:?}", name, args);
    }
}

#[tokio::test]
async fn test_search_without_hits_is_empty_fallback() {
    let chain = SearchChain::new(
        None,
        vec![
            Box::new(FakeProvider::answering("ddg", 0)),
            Box::new(FakeProvider::failing("wiki")),
        ],
    );
    let result = dispatcher_with(chain)
        .dispatch(&call("search", r#"{"query": "zzqx"}"#))
        .await;

    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&result.to_text()).unwrap(),
        json!({"provider": "fallback", "query": "zzqx", "results": []})
    );
}

#[tokio::test]
async fn test_primary_provider_answers() {
    let fallback = FakeProvider::answering("ddg", 3);
    let fallback_calls = fallback.calls.clone();
    let chain = SearchChain::new(
        Some(Box::new(FakeProvider::answering("google-cse", 2))),
        vec![Box::new(fallback)],
    );

    let result = dispatcher_with(chain)
        .dispatch(&call("search", r#"{"query": "rust"}"#))
        .await;

    match result {
        ToolResult::Search(SearchResults { provider, results, .. }) => {
            assert_eq!(provider, "google-cse");
            assert_eq!(results.len(), 2);
        }
        other => panic!("expected search results, got {:?}", other),
    }
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_or_failing_primary_falls_through() {
    for primary in [FakeProvider::answering("google-cse", 0), FakeProvider::failing("google-cse")] {
        let chain = SearchChain::new(
            Some(Box::new(primary)),
            vec![Box::new(FakeProvider::answering("ddg", 1))],
        );
        let result = dispatcher_with(chain)
            .dispatch(&call("search", r#"{"query": "rust"}"#))
            .await;

        match result {
            ToolResult::Search(results) => {
                assert_eq!(results.provider, "fallback");
                assert_eq!(results.results.len(), 1);
                assert_eq!(results.results[0].title, "ddg 0");
            }
            other => panic!("expected search results, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_fallback_chain_merges_and_stops_at_limit() {
    let ddg = FakeProvider::answering("ddg", 2);
    let wiki = FakeProvider::answering("wiki", 5);
    let wiki_limits = wiki.limits.clone();
    let chain = SearchChain::new(None, vec![Box::new(ddg), Box::new(wiki)]);
    let dispatcher = dispatcher_with(chain);

    let result = dispatcher
        .dispatch(&call("search", r#"{"query": "rust", "limit": 4}"#))
        .await;
    let titles: Vec<String> = match result {
        ToolResult::Search(results) => results.results.into_iter().map(|h| h.title).collect(),
        other => panic!("expected search results, got {:?}", other),
    };
    assert_eq!(titles, vec!["ddg 0", "ddg 1", "wiki 0", "wiki 1"]);
    // Wikipedia is only asked for what is still missing
    assert_eq!(*wiki_limits.lock().unwrap(), vec![2]);

    // The first provider already fills the limit, so the second is skipped
    let result = dispatcher
        .dispatch(&call("search", r#"{"query": "rust", "limit": 1}"#))
        .await;
    match result {
        ToolResult::Search(results) => assert_eq!(results.results.len(), 1),
        other => panic!("expected search results, got {:?}", other),
    }
    assert_eq!(wiki_limits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_search_limit_is_clamped() {
    let ddg = FakeProvider::answering("ddg", 20);
    let limits = ddg.limits.clone();
    let dispatcher = dispatcher_with(SearchChain::new(None, vec![Box::new(ddg)]));

    dispatcher
        .dispatch(&call("search", r#"{"query": "rust", "limit": 50}"#))
        .await;
    dispatcher
        .dispatch(&call("search", r#"{"query": "rust", "limit": 0}"#))
        .await;
    dispatcher.dispatch(&call("search", r#"{"query": "rust"}"#)).await;

    assert_eq!(*limits.lock().unwrap(), vec![10, 5, 5]);
}

#[tokio::test]
async fn test_transform_preview_without_credentials() {
    let data = "a".repeat(100) + &"b".repeat(100);
    let args = json!({ "data": data }).to_string();
    let result = empty_dispatcher().dispatch(&call("transform", &args)).await;

    match result {
        ToolResult::Transform(out) => {
            let expected = format!("{}{}...", "a".repeat(100), "b".repeat(57));
            assert_eq!(out.output, json!(expected));
            assert_eq!(out.confidence, Some(0.42));
            assert_eq!(out.workflow, "summarize");
            assert!(out.raw.is_none());
        }
        other => panic!("expected transform output, got {:?}", other),
    }
}

/// Unreachable workflow and generation endpoints fall through to the preview
#[tokio::test]
async fn test_failing_transform_tiers_fall_through() {
    let pipeline = TransformPipeline::new(
        reqwest::Client::new(),
        vec![
            TransformTier::Workflow {
                url: "http://127.0.0.1:1/run".to_string(),
            },
            TransformTier::Generation {
                url: "http://127.0.0.1:1/responses".to_string(),
                token: "token".to_string(),
                model: "gpt-4.1-nano".to_string(),
            },
        ],
    );
    assert_eq!(pipeline.tier_names(), vec!["workflow", "generation", "preview"]);
    let dispatcher = dispatcher_with_parts(SearchChain::new(None, vec![]), pipeline);

    let data = "z".repeat(200);
    let args = json!({ "data": data }).to_string();
    let (result, warnings) = dispatcher.dispatch_with_warnings(&call("transform", &args)).await;

    assert!(!result.is_error());
    match result {
        ToolResult::Transform(out) => {
            assert_eq!(out.workflow, "summarize");
            assert_eq!(out.output, json!(format!("{}...", "z".repeat(157))));
            assert_eq!(out.confidence, Some(0.42));
            assert!(out.raw.is_none());
        }
        other => panic!("expected transform output, got {:?}", other),
    }
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].starts_with("workflow transform failed"));
    assert!(warnings[1].starts_with("generation transform failed"));
}

#[tokio::test]
async fn test_failed_search_providers_are_reported() {
    let chain = SearchChain::new(
        Some(Box::new(FakeProvider::failing("google-cse"))),
        vec![
            Box::new(FakeProvider::failing("ddg")),
            Box::new(FakeProvider::answering("wiki", 1)),
        ],
    );
    let (result, warnings) = dispatcher_with(chain)
        .dispatch_with_warnings(&call("search", r#"{"query": "rust"}"#))
        .await;

    assert!(!result.is_error());
    assert_eq!(
        warnings,
        vec![
            "google-cse search failed: google-cse returned HTTP 503".to_string(),
            "ddg search failed: ddg returned HTTP 503".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_transform_keeps_named_workflow() {
    let result = empty_dispatcher()
        .dispatch(&call("transform", r#"{"workflow": "outline", "data": "short"}"#))
        .await;
    match result {
        ToolResult::Transform(out) => {
            assert_eq!(out.workflow, "outline");
            assert_eq!(out.output, json!("short"));
        }
        other => panic!("expected transform output, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_code_returns_logs_and_value() {
    let result = empty_dispatcher()
        .dispatch(&call("run_code", r#"{"code": "console.log('x'); return 2+2;"}"#))
        .await;

    match result {
        ToolResult::Execution(outcome) => {
            assert_eq!(outcome.result, json!(4));
            assert!(outcome.error.is_none());
            assert_eq!(outcome.logs.len(), 1);
            assert!(outcome.logs[0].args.contains(&json!("x")));
        }
        other => panic!("expected execution outcome, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_code_error_is_a_result() {
    let result = empty_dispatcher()
        .dispatch(&call("run_code", r#"{"code": "return missing.field;"}"#))
        .await;

    assert!(result.is_error());
    match result {
        ToolResult::Execution(outcome) => {
            assert_eq!(outcome.result, serde_json::Value::Null);
            assert!(outcome.error.unwrap().contains("missing"));
        }
        other => panic!("expected execution outcome, got {:?}", other),
    }
}
