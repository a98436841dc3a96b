//! Static rule tables for the safety gate.
//!
//! Submitted code is Python-flavoured source; rules are ordered and every
//! matching rule contributes one issue. A single `Dangerous` match rejects.

use mathstake_types::CodeType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered: `Safe < Warning < Dangerous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Safe,
    Warning,
    Dangerous,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Dangerous => "dangerous",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    ProcessAccess,
    FileSystem,
    DynamicExecution,
    Network,
    Serialization,
    Reflection,
    ResourceExhaustion,
    Identity,
    Nondeterminism,
}

pub struct Rule {
    pub pattern: Regex,
    pub issue: &'static str,
    pub severity: Severity,
    pub category: RuleCategory,
}

impl Rule {
    fn new(pattern: &str, issue: &'static str, severity: Severity, category: RuleCategory) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("static rule pattern must compile"),
            issue,
            severity,
            category,
        }
    }

    pub fn matches(&self, code: &str) -> bool {
        self.pattern.is_match(code)
    }
}

/// Pattern for an import of any of `modules` (a regex alternation). Matches
/// every name of a comma-separated `import` list, `from X import` forms, and
/// statements that follow a `;`.
fn import_of(modules: &str) -> String {
    format!(
        r"(?m)(?:^|;)\s*(?:import\s+(?:[\w.]+(?:\s+as\s+\w+)?\s*,\s*)*(?:{m})\b|from\s+(?:{m})(?:\.[\w.]*)?\s+import\b)",
        m = modules
    )
}

/// Rules applied to every code type.
pub static GENERAL_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use RuleCategory::*;
    use Severity::*;
    vec![
        // OS / process / thread / signal
        Rule::new(
            &import_of("os"),
            "Operating system module access (os) is not allowed",
            Dangerous,
            ProcessAccess,
        ),
        Rule::new(
            &import_of(
                "subprocess|sys|shutil|ctypes|multiprocessing|threading|_thread|signal|pty|resource|asyncio|concurrent",
            ),
            "Process, thread or signal module access is not allowed",
            Dangerous,
            ProcessAccess,
        ),
        Rule::new(
            r"\bos\.(?:system|popen|exec\w*|spawn\w*|fork|kill|remove|unlink|rmdir|environ|getenv|walk|listdir)\b",
            "Operating system call detected",
            Dangerous,
            ProcessAccess,
        ),
        Rule::new(
            r"\b(?:exit|quit)\s*\(",
            "Interpreter exit calls are not allowed",
            Warning,
            ProcessAccess,
        ),
        // Filesystem
        Rule::new(
            r"\bopen\s*\(",
            "File system access (open) is not allowed",
            Dangerous,
            FileSystem,
        ),
        Rule::new(
            &import_of("pathlib|glob|tempfile|io|fileinput|zipfile|tarfile"),
            "File system module access is not allowed",
            Dangerous,
            FileSystem,
        ),
        // Dynamic execution
        Rule::new(
            r"\b(?:eval|exec|compile)\s*\(",
            "Dynamic code execution (eval/exec/compile) is not allowed",
            Dangerous,
            DynamicExecution,
        ),
        Rule::new(
            r"__import__\s*\(|\bimportlib\b",
            "Dynamic imports are not allowed",
            Dangerous,
            DynamicExecution,
        ),
        // Network
        Rule::new(
            &import_of(
                r"requests|urllib\d?|http|socket|smtplib|ftplib|telnetlib|aiohttp|httpx|paramiko|websocket\w*",
            ),
            "Network library access is not allowed",
            Dangerous,
            Network,
        ),
        Rule::new(
            r"(?i)\b(?:https?|ftp|wss?)://",
            "Raw URLs are not allowed",
            Dangerous,
            Network,
        ),
        Rule::new(
            r"\.(?:post|get|put|patch|delete|request|urlopen)\s*\(\s*(?:url\b|['\x22])",
            "HTTP request calls are not allowed",
            Dangerous,
            Network,
        ),
        // Serialization exploits
        Rule::new(
            r"\b(?:pickle|cPickle|marshal|shelve|dill)\b",
            "Unsafe serialization modules (pickle/marshal/shelve) are not allowed",
            Dangerous,
            Serialization,
        ),
        // Reflection / introspection
        Rule::new(
            r"__(?:globals|builtins|subclasses|code|class|bases|mro|dict|getattribute|reduce|reduce_ex|loader|spec)__",
            "Access to interpreter internals is not allowed",
            Dangerous,
            Reflection,
        ),
        Rule::new(
            &import_of("inspect|gc|types|dis|code|codeop|builtins"),
            "Code introspection modules are not allowed",
            Dangerous,
            Reflection,
        ),
        Rule::new(
            r"\b(?:globals|locals|vars)\s*\(\s*\)",
            "Namespace introspection detected",
            Warning,
            Reflection,
        ),
        Rule::new(
            r"\b(?:getattr|setattr|delattr)\s*\(",
            "Dynamic attribute access detected",
            Warning,
            Reflection,
        ),
        // Resource exhaustion
        Rule::new(
            r"\bwhile\s+(?:True|1)\s*:",
            "Potentially unbounded loop (while True)",
            Warning,
            ResourceExhaustion,
        ),
        Rule::new(
            r"\bitertools\.(?:count|cycle|repeat)\s*\(",
            "Potentially infinite iterator",
            Warning,
            ResourceExhaustion,
        ),
        Rule::new(
            r"\brange\s*\(\s*\d{9,}|\*\s*\d{8,}|\*\*\s*\d{3,}",
            "Very large iteration or allocation",
            Warning,
            ResourceExhaustion,
        ),
        Rule::new(
            r"\binput\s*\(",
            "Interactive input is not available in the sandbox",
            Warning,
            ResourceExhaustion,
        ),
    ]
});

/// Extra rules for cost functions, which must be pure and identity-blind
/// functions of `(test_input, solution_output)`.
pub static COST_FUNCTION_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use RuleCategory::*;
    use Severity::*;
    vec![
        Rule::new(
            r"(?i)\b(?:submitter|creator|author|owner)(?:_?(?:id|name|address|wallet))?\b|\b(?:user|account|profile)_?(?:id|name|address|wallet)\b",
            "Cost function references participant identity",
            Dangerous,
            Identity,
        ),
        Rule::new(
            r#"(?m)\bif\s+[^\n:]*['"][^'"\n]*['"][^\n:]*:\s*return\s+0(?:\.0+)?\s*(?:$|#|;)"#,
            "Conditional zero-cost return keyed on a string literal",
            Dangerous,
            Identity,
        ),
        Rule::new(
            &format!(r"{}|\brandom\.\w+\s*\(", import_of("random")),
            "Cost function uses randomness",
            Dangerous,
            Nondeterminism,
        ),
        Rule::new(
            r"\b(?:time|datetime|date)\.(?:time|now|today|utcnow|perf_counter|monotonic|process_time|time_ns)\s*\(",
            "Cost function reads the wall clock",
            Dangerous,
            Nondeterminism,
        ),
        Rule::new(
            &import_of("uuid|secrets"),
            "Cost function uses a nondeterministic source",
            Dangerous,
            Nondeterminism,
        ),
        Rule::new(
            &import_of("time|datetime"),
            "Cost function imports a time module",
            Warning,
            Nondeterminism,
        ),
    ]
});

/// Rules that apply to `code_type`, in evaluation order.
pub fn rules_for(code_type: CodeType) -> impl Iterator<Item = &'static Rule> {
    let extra: &'static [Rule] = match code_type {
        CodeType::CostFunction => COST_FUNCTION_RULES.as_slice(),
        CodeType::TestInputGenerator | CodeType::Algorithm => &[],
    };
    GENERAL_RULES.iter().chain(extra.iter())
}
