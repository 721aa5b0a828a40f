//! End-to-end tests for `Orchestrator::run()` with a scripted model.

use serde_json::json;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use toolrelay_core::{
    ConversationTurn, FALLBACK_MESSAGE, GenerateError, Generation, Generator, Orchestrator,
    OrchestratorError, OrchestratorEvent, Role, prompt::TRUNCATION_NOTICE,
};
use toolrelay_mcp::tool::{META_PROVIDER, META_TOOL};
use toolrelay_mcp::{ProviderConfig, ToolCall, ToolInfo, ToolManager, spawn_provider_process};

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// What the generator saw on one call.
#[derive(Debug, Clone)]
struct Seen {
    prompt: String,
    tool_count: usize,
    history_len: usize,
}

/// Replays canned generations in order; once the script runs out it keeps
/// answering with `fallback`.
struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Generation, GenerateError>>>,
    fallback: Option<Generation>,
    seen: Mutex<Vec<Seen>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    fn new(script: Vec<Result<Generation, GenerateError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    fn repeating(generation: Generation) -> Self {
        Self {
            fallback: Some(generation),
            ..Self::new(Vec::new())
        }
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        tools: &'a [ToolInfo],
        history: &'a [ConversationTurn],
    ) -> Pin<Box<dyn Future<Output = Result<Generation, GenerateError>> + Send + 'a>> {
        self.seen.lock().unwrap().push(Seen {
            prompt: prompt.to_string(),
            tool_count: tools.len(),
            history_len: history.len(),
        });
        let next = self.script.lock().unwrap().pop_front();
        let next = next.unwrap_or_else(|| {
            self.fallback
                .clone()
                .ok_or_else(|| GenerateError::Request("script exhausted".into()))
        });
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            next
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn text(s: &str) -> Result<Generation, GenerateError> {
    Ok(Generation::Text(s.to_string()))
}

fn call(
    provider: &str,
    tool: &str,
    arguments: serde_json::Value,
) -> Result<Generation, GenerateError> {
    Ok(Generation::ToolCall(ToolCall::new(provider, tool, arguments)))
}

fn meta_call() -> Result<Generation, GenerateError> {
    call(META_PROVIDER, META_TOOL, json!({}))
}

async fn run(
    orchestrator: &Orchestrator,
    prompt: &str,
    history: &[ConversationTurn],
) -> (Result<toolrelay_core::Completion, OrchestratorError>, Vec<OrchestratorEvent>) {
    let mut events = Vec::new();
    let result = orchestrator
        .run(prompt, history, CancellationToken::new(), |e| events.push(e))
        .await;
    (result, events)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plain_text_answer_returns_immediately() {
    let generator = Arc::new(ScriptedGenerator::new(vec![text("Hello!")]));
    let orchestrator = Orchestrator::new(generator.clone(), Arc::new(ToolManager::new()));
    let history = vec![ConversationTurn::user("earlier"), ConversationTurn::assistant("ok")];

    let (result, events) = run(&orchestrator, "hi", &history).await;
    let completion = result.unwrap();

    assert_eq!(completion.text, "Hello!");
    assert_eq!(completion.iterations, 1);
    assert!(!completion.fell_back);
    assert_eq!(events, vec![OrchestratorEvent::Done]);

    let seen = generator.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].prompt, "hi");
    assert_eq!(seen[0].history_len, 2);
    // The catalog always carries the meta tool.
    assert_eq!(seen[0].tool_count, 1);
}

#[tokio::test]
async fn tool_output_is_folded_into_next_prompt() {
    let generator = Arc::new(ScriptedGenerator::new(vec![meta_call(), text("There are none.")]));
    let orchestrator = Orchestrator::new(generator.clone(), Arc::new(ToolManager::new()));
    let history = vec![ConversationTurn::user("earlier")];

    let (result, events) = run(&orchestrator, "which tools exist?", &history).await;
    let completion = result.unwrap();

    assert_eq!(completion.text, "There are none.");
    assert_eq!(completion.iterations, 2);
    assert_eq!(
        events,
        vec![
            OrchestratorEvent::ToolStart {
                provider: META_PROVIDER.into(),
                tool: META_TOOL.into(),
                arguments: json!({}),
            },
            OrchestratorEvent::ToolEnd {
                provider: META_PROVIDER.into(),
                tool: META_TOOL.into(),
                output: "No tools available.".into(),
            },
            OrchestratorEvent::Done,
        ]
    );

    let seen = generator.seen();
    // History only on the first iteration.
    assert_eq!(seen[0].history_len, 1);
    assert_eq!(seen[1].history_len, 0);
    assert!(seen[1].prompt.contains("which tools exist?"));
    assert!(seen[1].prompt.contains("No tools available."));

    let roles: Vec<Role> = completion.turns.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
}

#[tokio::test]
async fn failing_tool_calls_end_in_fallback() {
    let generator = Arc::new(ScriptedGenerator::repeating(Generation::ToolCall(
        ToolCall::new("missing", "tool", json!({})),
    )));
    let orchestrator = Orchestrator::new(generator.clone(), Arc::new(ToolManager::new()));

    let (result, events) = run(&orchestrator, "do it", &[]).await;
    let completion = result.unwrap();

    assert!(completion.fell_back);
    assert_eq!(completion.text, FALLBACK_MESSAGE);
    assert_eq!(completion.iterations, 3);
    assert_eq!(generator.seen().len(), 3);

    let failures = events
        .iter()
        .filter(|e| matches!(e, OrchestratorEvent::ToolFailed { .. }))
        .count();
    assert_eq!(failures, 3);
    assert_eq!(
        &events[events.len() - 2..],
        &[
            OrchestratorEvent::IterationLimit { iterations: 3 },
            OrchestratorEvent::Done
        ]
    );
    assert!(generator.seen()[1].prompt.contains("missing/tool failed with"));
    assert!(generator.seen()[1].prompt.contains("not registered"));
}

#[tokio::test]
async fn endless_successful_tool_calls_are_bounded() {
    let generator = Arc::new(ScriptedGenerator::repeating(Generation::ToolCall(
        ToolCall::new(META_PROVIDER, META_TOOL, json!({})),
    )));
    let orchestrator =
        Orchestrator::new(generator.clone(), Arc::new(ToolManager::new())).with_max_iterations(5);

    let (result, _) = run(&orchestrator, "loop forever", &[]).await;
    let completion = result.unwrap();
    assert!(completion.fell_back);
    assert_eq!(completion.iterations, 5);
    assert_eq!(generator.seen().len(), 5);
}

#[tokio::test]
async fn failure_then_recovery() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        call("web", "search", json!({"query": "x"})),
        meta_call(),
        text("Recovered."),
    ]));
    let orchestrator = Orchestrator::new(generator, Arc::new(ToolManager::new()));

    let (result, events) = run(&orchestrator, "q", &[]).await;
    let completion = result.unwrap();
    assert_eq!(completion.text, "Recovered.");
    assert_eq!(completion.iterations, 3);
    assert!(matches!(events[1], OrchestratorEvent::ToolFailed { .. }));
    assert!(matches!(events[3], OrchestratorEvent::ToolEnd { .. }));
}

#[tokio::test]
async fn long_tool_output_is_truncated() {
    let generator = Arc::new(ScriptedGenerator::new(vec![meta_call(), text("done")]));
    let orchestrator = Orchestrator::new(generator.clone(), Arc::new(ToolManager::new()))
        .with_max_tool_output_chars(8);

    let (result, events) = run(&orchestrator, "q", &[]).await;
    result.unwrap();

    let expected = format!("No tools{TRUNCATION_NOTICE}");
    assert!(events.contains(&OrchestratorEvent::ToolEnd {
        provider: META_PROVIDER.into(),
        tool: META_TOOL.into(),
        output: expected.clone(),
    }));
    assert!(generator.seen()[1].prompt.contains(&expected));
}

#[tokio::test]
async fn generator_error_is_returned() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Err(GenerateError::Request(
        "connection refused".into(),
    ))]));
    let orchestrator = Orchestrator::new(generator, Arc::new(ToolManager::new()));

    let (result, events) = run(&orchestrator, "q", &[]).await;
    assert!(matches!(
        result,
        Err(OrchestratorError::Generator(GenerateError::Request(_)))
    ));
    assert!(events.is_empty());
}

#[tokio::test]
async fn zero_iteration_budget_falls_back() {
    let generator = Arc::new(ScriptedGenerator::new(vec![text("never asked")]));
    let orchestrator =
        Orchestrator::new(generator.clone(), Arc::new(ToolManager::new())).with_max_iterations(0);

    let (result, _) = run(&orchestrator, "q", &[]).await;
    assert!(result.unwrap().fell_back);
    assert!(generator.seen().is_empty());
}

#[tokio::test]
async fn cancel_during_generation() {
    let generator = Arc::new(ScriptedGenerator {
        delay: Some(Duration::from_secs(30)),
        ..ScriptedGenerator::new(vec![text("too late")])
    });
    let orchestrator = Orchestrator::new(generator, Arc::new(ToolManager::new()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let start = tokio::time::Instant::now();
    let result = orchestrator.run("q", &[], cancel, |_| {}).await;
    assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn provider_stderr_is_shown_to_the_model() {
    // Answers the handshake and writes a diagnostic to stderr on every call.
    let script = r#"
id_re='"id":([0-9]+)'
method_re='"method":"([^"]+)"'
while IFS= read -r line; do
  [[ $line =~ $method_re ]] || continue
  method="${BASH_REMATCH[1]}"
  [[ $line =~ $id_re ]] || continue
  id="${BASH_REMATCH[1]}"
  case "$method" in
    initialize) echo '{"jsonrpc":"2.0","id":'$id',"result":{}}' ;;
    tools/list) echo '{"jsonrpc":"2.0","id":'$id',"result":{"tools":[{"name":"greet"}]}}' ;;
    tools/call)
      echo "warning: greeting quota low" >&2
      sleep 0.2
      echo '{"jsonrpc":"2.0","id":'$id',"result":{"content":[{"type":"text","text":"hello there"}]}}'
      ;;
  esac
done
"#;
    let mut config = ProviderConfig::stdio("bash", vec!["-c".into(), script.into()]);
    config.shutdown_grace_ms = 500;
    config.kill_wait_ms = 500;
    let child = spawn_provider_process("greeter", &config).unwrap();
    let mut manager = ToolManager::new();
    manager.register("greeter", &config, Some(child)).unwrap();
    let manager = Arc::new(manager);

    let generator = Arc::new(ScriptedGenerator::new(vec![
        call("greeter", "greet", json!({})),
        text("They said hello."),
    ]));
    let orchestrator = Orchestrator::new(generator.clone(), manager.clone());

    let (result, events) = run(&orchestrator, "greet me", &[]).await;
    assert_eq!(result.unwrap().text, "They said hello.");
    assert_eq!(generator.seen()[0].tool_count, 2);

    let output = events
        .iter()
        .find_map(|e| match e {
            OrchestratorEvent::ToolEnd { output, .. } => Some(output.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        output,
        "hello there\n\nProvider stderr:\nwarning: greeting quota low"
    );
    manager.close_all().await;
}
