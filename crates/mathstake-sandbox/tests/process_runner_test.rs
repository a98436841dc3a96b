//! Drives `ProcessRunner` with POSIX shell scripts that speak the line
//! protocol, plus the Python harness when an interpreter is installed.
#![cfg(unix)]

use async_trait::async_trait;
use mathstake_sandbox::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn shell_runner() -> ProcessRunner {
    ProcessRunner::new(ProcessRunnerConfig {
        interpreter: "sh".into(),
        interpreter_args: vec![],
        harness: None,
        ..Default::default()
    })
}

struct EchoHost;

#[async_trait]
impl HostFunctions for EchoHost {
    async fn call(&self, capability: Capability, args: &[Value]) -> Result<Value> {
        Ok(json!({"capability": capability.as_str(), "args": args}))
    }
}

#[tokio::test]
async fn test_result_line() {
    let script = "read request\necho 'starting up'\necho '{\"result\": 42}'\n";
    let request = ExecutionRequest::new(script, "solve", vec![json!(1)]);
    let value = shell_runner().run(&request, &NoHost).await.unwrap();
    assert_eq!(value, json!(42));
}

#[tokio::test]
async fn test_program_error_line() {
    let script = "read request\necho '{\"error\": \"ValueError: bad input\"}'\n";
    let request = ExecutionRequest::new(script, "solve", vec![]);
    let err = shell_runner().run(&request, &NoHost).await.unwrap_err();
    assert!(matches!(err, SandboxError::ProgramError(ref m) if m.contains("bad input")));
}

#[tokio::test]
async fn test_exit_without_result() {
    let script = "read request\necho 'traceback here' >&2\nexit 1\n";
    let request = ExecutionRequest::new(script, "solve", vec![]);
    let err = shell_runner().run(&request, &NoHost).await.unwrap_err();
    assert!(matches!(err, SandboxError::NoResult(ref m) if m.contains("traceback here")));
}

#[tokio::test]
async fn test_declared_host_call_is_served() {
    let script = concat!(
        "read request\n",
        "echo '{\"call\": \"fetch_random\", \"args\": [1, 10, 3]}'\n",
        "read reply\n",
        "echo \"{\\\"result\\\": $reply}\"\n",
    );
    let request = ExecutionRequest::new(script, "generate_test_input", vec![])
        .with_capabilities([Capability::FetchRandom]);
    let value = shell_runner().run(&request, &EchoHost).await.unwrap();
    assert_eq!(value["ok"]["capability"], "fetch_random");
    assert_eq!(value["ok"]["args"], json!([1, 10, 3]));
}

#[tokio::test]
async fn test_undeclared_host_call_fails_run() {
    let script = concat!(
        "read request\n",
        "echo '{\"call\": \"fetch_stock\", \"args\": [\"AAPL\"]}'\n",
        "read reply\n",
        "echo '{\"result\": 1}'\n",
    );
    let request = ExecutionRequest::new(script, "solve", vec![]);
    let err = shell_runner().run(&request, &EchoHost).await.unwrap_err();
    assert!(matches!(err, SandboxError::CapabilityDenied(ref name) if name == "fetch_stock"));
}

#[tokio::test]
async fn test_environment_is_cleared() {
    std::env::set_var("MATHSTAKE_SECRET_TOKEN", "hunter2");
    let script = "read request\necho \"{\\\"result\\\": \\\"${MATHSTAKE_SECRET_TOKEN:-none}\\\"}\"\n";
    let request = ExecutionRequest::new(script, "solve", vec![]);
    let value = shell_runner().run(&request, &NoHost).await.unwrap();
    assert_eq!(value, json!("none"));
}

#[tokio::test]
async fn test_output_limit() {
    let runner = ProcessRunner::new(ProcessRunnerConfig {
        interpreter: "sh".into(),
        interpreter_args: vec![],
        harness: None,
        max_output_bytes: 64,
        ..Default::default()
    });
    let script = "read request\nwhile true; do echo 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx'; done\n";
    let request = ExecutionRequest::new(script, "solve", vec![]);
    let err = runner.run(&request, &NoHost).await.unwrap_err();
    assert!(matches!(err, SandboxError::OutputLimit(64)));
}

#[tokio::test]
async fn test_executor_kills_hung_process() {
    let executor = SandboxExecutor::new(
        Arc::new(shell_runner()),
        ExecutorConfig {
            timeout: Duration::from_millis(200),
            max_concurrent: 1,
        },
    );
    let outcome = executor.run_solver("read request\nsleep 30\n", &json!(1)).await;
    assert!(!outcome.is_success());
    assert_eq!(outcome.execution_time_ms, 200);
}

#[tokio::test]
async fn test_missing_interpreter() {
    let runner = ProcessRunner::new(ProcessRunnerConfig {
        interpreter: "mathstake-no-such-interpreter".into(),
        ..Default::default()
    });
    let request = ExecutionRequest::new("", "solve", vec![]);
    let err = runner.run(&request, &NoHost).await.unwrap_err();
    assert!(matches!(err, SandboxError::Spawn(_)));
}

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_python_harness_end_to_end() {
    if !python_available() {
        return;
    }
    let executor = SandboxExecutor::new(Arc::new(ProcessRunner::default()), ExecutorConfig::default());

    let solver = "def solve(test_input):\n    print('debug output is ignored')\n    return sum(test_input)\n";
    let outcome = executor.run_solver(solver, &json!([1, 2, 3])).await;
    assert_eq!(outcome.output, Some(json!(6)));

    let cost = "def cost(test_input, solution_output):\n    return abs(sum(test_input) - solution_output)\n";
    let scored = executor.run_cost(cost, &json!([1, 2, 3]), &json!(4)).await;
    assert_eq!(scored.cost, 2.0);

    let crashing = "def solve(test_input):\n    return 1 / 0\n";
    let outcome = executor.run_solver(crashing, &json!(1)).await;
    assert!(outcome.error.unwrap().contains("ZeroDivisionError"));

    let generator = "def generate_test_input():\n    return fetch_random(1, 2, 1)['values']\n";
    let outcome = executor.run_generator(generator, &EchoHost).await;
    assert!(!outcome.is_success(), "EchoHost returns no 'values' key");

    let no_fetchers = "def solve(test_input):\n    return fetch_stock('AAPL')\n";
    let outcome = executor.run_solver(no_fetchers, &json!(1)).await;
    assert!(outcome.error.unwrap().contains("NameError"));
}
