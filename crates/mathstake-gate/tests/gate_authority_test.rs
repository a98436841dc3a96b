use async_trait::async_trait;
use mathstake_gate::*;
use mathstake_types::CodeType;
use std::sync::Arc;

/// Reviewer that approves everything.
struct PermissiveReviewer;

#[async_trait]
impl SemanticReviewer for PermissiveReviewer {
    async fn review(&self, _code: &str, _code_type: CodeType) -> Result<ReviewVerdict> {
        Ok(ReviewVerdict::safe())
    }
}

fn with_entry(body: &str, code_type: CodeType) -> String {
    format!(
        "{}\n\ndef {}(*args):\n    return 0\n",
        body,
        code_type.entry_point()
    )
}

#[tokio::test]
async fn test_dangerous_patterns_cannot_be_overridden() {
    let gate = CodeSafetyGate::new(GateConfig::default()).with_reviewer(Arc::new(PermissiveReviewer));

    let snippets = [
        "import os",
        "from os import path",
        "import subprocess",
        "import threading",
        "data = open('/etc/passwd').read()",
        "eval('1 + 1')",
        "exec('x = 1')",
        "m = __import__('os')",
        "import importlib",
        "import socket",
        "from urllib import request",
        "URL = 'https://evil.example.com'",
        "import pickle",
        "import marshal",
        "x = ().__class__.__bases__[0].__subclasses__()",
        "import inspect",
        "import math, os",
        "import math, subprocess",
        "import math, socket",
        "import math; import os",
        "import math as m, shutil as sh",
        "x = 1; from os import path",
    ];

    for code_type in [CodeType::Algorithm, CodeType::CostFunction, CodeType::TestInputGenerator] {
        for snippet in snippets {
            let code = with_entry(snippet, code_type);
            let report = gate.validate(&code, code_type).await;
            assert!(
                !report.is_valid,
                "expected rejection for {:?} in {}",
                snippet,
                code_type
            );
            assert_eq!(report.severity, Severity::Dangerous);
            assert!(!report.reviewed, "reviewer must not run after a dangerous finding");
        }
    }
}

#[tokio::test]
async fn test_cost_function_purity_rules() {
    let gate = CodeSafetyGate::new(GateConfig::default());

    let impure = [
        "def cost(test_input, solution_output):\n    import random\n    return random.random()\n",
        "def cost(test_input, solution_output):\n    return time.time() % 2\n",
        "def cost(test_input, solution_output, submitter_id=None):\n    return 1\n",
        "def cost(test_input, solution_output):\n    if solution_output == 'winner':\n        return 0\n    return 1\n",
    ];

    for code in impure {
        let report = gate.validate(code, CodeType::CostFunction).await;
        assert!(!report.is_valid, "expected cost function rejection: {}", code);
    }

    let pure = "def cost(test_input, solution_output):\n    return sum((a - b) ** 2 for a, b in zip(test_input, solution_output))\n";
    let report = gate.validate(pure, CodeType::CostFunction).await;
    assert!(report.is_valid);
    assert_eq!(report.severity, Severity::Safe);
}

#[tokio::test]
async fn test_request_json_shape() {
    let gate = CodeSafetyGate::new(GateConfig::default());
    let request: ValidationRequest = serde_json::from_str(
        r#"{"code": "def solve(x):\n    return x\n", "codeType": "algorithm"}"#,
    )
    .unwrap();
    let report = gate.validate_request(&request).await;
    assert!(report.is_valid);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["severity"], "safe");
    assert_eq!(json["is_valid"], true);
}
