use crate::error::{GateError, Result};
use crate::reviewer::SemanticReviewer;
use crate::rules::{rules_for, Severity};
use mathstake_types::CodeType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Code larger than this is rejected outright.
    pub max_code_bytes: usize,
    /// Upper bound on a single semantic review.
    pub reviewer_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_code_bytes: 64 * 1024,
            reviewer_timeout: Duration::from_secs(20),
        }
    }
}

/// Raw gate input as received from a client; either field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub code: Option<String>,
    #[serde(rename = "codeType", alias = "code_type")]
    pub code_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub severity: Severity,
    /// Whether a semantic reviewer contributed to this report.
    pub reviewed: bool,
}

impl ValidationReport {
    fn from_findings(issues: Vec<String>, severity: Severity, reviewed: bool) -> Self {
        Self {
            is_valid: severity != Severity::Dangerous,
            issues,
            severity,
            reviewed,
        }
    }

    fn rejected(issue: impl Into<String>) -> Self {
        Self::from_findings(vec![issue.into()], Severity::Dangerous, false)
    }

    /// Turns a rejection into [`GateError::Rejected`].
    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(GateError::Rejected {
                severity: self.severity,
                issues: self.issues.clone(),
            })
        }
    }
}

/// Classifies submitted code as safe, warning or dangerous.
pub struct CodeSafetyGate {
    config: GateConfig,
    reviewer: Option<Arc<dyn SemanticReviewer>>,
}

impl CodeSafetyGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            reviewer: None,
        }
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn SemanticReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Validates a raw request. Missing or unknown fields are a dangerous
    /// rejection rather than an error.
    pub async fn validate_request(&self, request: &ValidationRequest) -> ValidationReport {
        let Some(code) = request.code.as_deref() else {
            return ValidationReport::rejected("Missing code");
        };
        let Some(raw_type) = request.code_type.as_deref() else {
            return ValidationReport::rejected("Missing codeType");
        };
        match raw_type.parse::<CodeType>() {
            Ok(code_type) => self.validate(code, code_type).await,
            Err(e) => ValidationReport::rejected(e.to_string()),
        }
    }

    /// Full validation: static pass, then optional semantic review.
    pub async fn validate(&self, code: &str, code_type: CodeType) -> ValidationReport {
        let static_report = self.static_scan(code, code_type);

        if static_report.severity == Severity::Dangerous {
            info!(
                code_type = %code_type,
                issues = static_report.issues.len(),
                "🛑 Code rejected by static scan"
            );
            return static_report;
        }

        let Some(reviewer) = &self.reviewer else {
            return static_report;
        };

        match timeout(self.config.reviewer_timeout, reviewer.review(code, code_type)).await {
            Ok(Ok(verdict)) => {
                let mut issues = static_report.issues;
                for issue in verdict.issues {
                    if !issues.contains(&issue) {
                        issues.push(issue);
                    }
                }
                let severity = static_report.severity.max(verdict.severity);
                let report = ValidationReport::from_findings(issues, severity, true);
                debug!(
                    code_type = %code_type,
                    severity = %report.severity,
                    is_valid = report.is_valid,
                    "🔍 Semantic review merged"
                );
                report
            }
            Ok(Err(e)) => {
                warn!(code_type = %code_type, error = %e, "⚠️ Semantic reviewer failed, using static result");
                static_report
            }
            Err(_) => {
                warn!(
                    code_type = %code_type,
                    timeout_ms = self.config.reviewer_timeout.as_millis() as u64,
                    "⚠️ Semantic reviewer timed out, using static result"
                );
                static_report
            }
        }
    }

    /// Pattern-table scan plus structural checks. Pure.
    pub fn static_scan(&self, code: &str, code_type: CodeType) -> ValidationReport {
        if code.trim().is_empty() {
            return ValidationReport::rejected("Code is empty");
        }
        if code.len() > self.config.max_code_bytes {
            return ValidationReport::rejected(format!(
                "Code exceeds maximum size of {} bytes",
                self.config.max_code_bytes
            ));
        }

        let mut issues = Vec::new();
        let mut severity = Severity::Safe;

        for rule in rules_for(code_type) {
            if rule.matches(code) {
                issues.push(rule.issue.to_string());
                severity = severity.max(rule.severity);
            }
        }

        if !defines_entry_point(code, code_type) {
            let entry_severity = match code_type {
                CodeType::Algorithm => Severity::Warning,
                CodeType::CostFunction | CodeType::TestInputGenerator => Severity::Dangerous,
            };
            issues.push(format!(
                "Missing entry point: def {}(...)",
                code_type.entry_point()
            ));
            severity = severity.max(entry_severity);
        }

        ValidationReport::from_findings(issues, severity, false)
    }
}

fn entry_point_regex(code_type: CodeType) -> Regex {
    let pattern = format!(r"(?m)^\s*def\s+{}\s*\(", code_type.entry_point());
    Regex::new(&pattern).expect("entry point pattern must compile")
}

static SOLVE_ENTRY: Lazy<Regex> = Lazy::new(|| entry_point_regex(CodeType::Algorithm));
static COST_ENTRY: Lazy<Regex> = Lazy::new(|| entry_point_regex(CodeType::CostFunction));
static GENERATOR_ENTRY: Lazy<Regex> =
    Lazy::new(|| entry_point_regex(CodeType::TestInputGenerator));

fn defines_entry_point(code: &str, code_type: CodeType) -> bool {
    let pattern: &Regex = match code_type {
        CodeType::Algorithm => &*SOLVE_ENTRY,
        CodeType::CostFunction => &*COST_ENTRY,
        CodeType::TestInputGenerator => &*GENERATOR_ENTRY,
    };
    pattern.is_match(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reviewer::ReviewVerdict;
    use async_trait::async_trait;

    struct FixedReviewer(ReviewVerdict);

    #[async_trait]
    impl SemanticReviewer for FixedReviewer {
        async fn review(&self, _code: &str, _code_type: CodeType) -> Result<ReviewVerdict> {
            Ok(self.0.clone())
        }
    }

    struct FailingReviewer;

    #[async_trait]
    impl SemanticReviewer for FailingReviewer {
        async fn review(&self, _code: &str, _code_type: CodeType) -> Result<ReviewVerdict> {
            Err(GateError::ReviewerUnavailable("offline".into()))
        }
    }

    struct SlowReviewer;

    #[async_trait]
    impl SemanticReviewer for SlowReviewer {
        async fn review(&self, _code: &str, _code_type: CodeType) -> Result<ReviewVerdict> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ReviewVerdict::safe())
        }
    }

    #[test]
    fn test_entry_point_matches_its_code_type_only() {
        let generator = "def generate_test_input():\n    return [1, 2]\n";
        assert!(defines_entry_point(generator, CodeType::TestInputGenerator));
        assert!(!defines_entry_point(generator, CodeType::Algorithm));
        assert!(defines_entry_point("  def cost (a, b):\n    return 0\n", CodeType::CostFunction));
        assert!(!defines_entry_point("x = solve(1)\n", CodeType::Algorithm));
    }

    const CLEAN_SOLVER: &str = "def solve(test_input):\n    return sum(test_input)\n";

    #[tokio::test]
    async fn test_clean_code_is_safe() {
        let gate = CodeSafetyGate::new(GateConfig::default());
        let report = gate.validate(CLEAN_SOLVER, CodeType::Algorithm).await;
        assert!(report.is_valid);
        assert_eq!(report.severity, Severity::Safe);
        assert!(report.issues.is_empty());
        assert!(!report.reviewed);
    }

    #[tokio::test]
    async fn test_dangerous_static_finding_skips_reviewer() {
        let gate = CodeSafetyGate::new(GateConfig::default())
            .with_reviewer(Arc::new(FixedReviewer(ReviewVerdict::safe())));
        let code = "import os\n\ndef solve(x):\n    return os.getcwd()\n";
        let report = gate.validate(code, CodeType::Algorithm).await;
        assert!(!report.is_valid);
        assert_eq!(report.severity, Severity::Dangerous);
        assert!(!report.reviewed);
    }

    #[tokio::test]
    async fn test_reviewer_raises_severity() {
        let verdict = ReviewVerdict {
            issues: vec!["Obfuscated control flow".into()],
            severity: Severity::Dangerous,
        };
        let gate = CodeSafetyGate::new(GateConfig::default())
            .with_reviewer(Arc::new(FixedReviewer(verdict)));
        let report = gate.validate(CLEAN_SOLVER, CodeType::Algorithm).await;
        assert!(!report.is_valid);
        assert!(report.reviewed);
        assert_eq!(report.issues, vec!["Obfuscated control flow".to_string()]);
    }

    #[tokio::test]
    async fn test_issues_are_unioned() {
        let verdict = ReviewVerdict {
            issues: vec![
                "Potentially unbounded loop (while True)".into(),
                "Suspicious constant".into(),
            ],
            severity: Severity::Safe,
        };
        let gate = CodeSafetyGate::new(GateConfig::default())
            .with_reviewer(Arc::new(FixedReviewer(verdict)));
        let code = "def solve(x):\n    while True:\n        break\n    return x\n";
        let report = gate.validate(code, CodeType::Algorithm).await;
        assert!(report.is_valid);
        assert_eq!(report.severity, Severity::Warning);
        assert_eq!(report.issues.len(), 2);
    }

    #[tokio::test]
    async fn test_reviewer_failure_falls_back_to_static() {
        let gate = CodeSafetyGate::new(GateConfig::default()).with_reviewer(Arc::new(FailingReviewer));
        let report = gate.validate(CLEAN_SOLVER, CodeType::Algorithm).await;
        assert!(report.is_valid);
        assert!(!report.reviewed);
    }

    #[tokio::test]
    async fn test_reviewer_timeout_falls_back_to_static() {
        let config = GateConfig {
            reviewer_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let gate = CodeSafetyGate::new(config).with_reviewer(Arc::new(SlowReviewer));
        let report = gate.validate(CLEAN_SOLVER, CodeType::Algorithm).await;
        assert!(report.is_valid);
        assert!(!report.reviewed);
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let gate = CodeSafetyGate::new(GateConfig::default());

        let missing_code = ValidationRequest {
            code: None,
            code_type: Some("algorithm".into()),
        };
        let report = gate.validate_request(&missing_code).await;
        assert!(!report.is_valid);
        assert_eq!(report.issues, vec!["Missing code".to_string()]);

        let unknown_type = ValidationRequest {
            code: Some(CLEAN_SOLVER.into()),
            code_type: Some("shell_script".into()),
        };
        let report = gate.validate_request(&unknown_type).await;
        assert_eq!(report.severity, Severity::Dangerous);
        assert!(report.issues[0].contains("shell_script"));

        let missing_type = ValidationRequest {
            code: Some(CLEAN_SOLVER.into()),
            code_type: None,
        };
        assert!(!gate.validate_request(&missing_type).await.is_valid);
    }

    #[test]
    fn test_missing_entry_point_severity() {
        let gate = CodeSafetyGate::new(GateConfig::default());
        let solver = gate.static_scan("x = 1\n", CodeType::Algorithm);
        assert!(solver.is_valid);
        assert_eq!(solver.severity, Severity::Warning);

        let cost = gate.static_scan("x = 1\n", CodeType::CostFunction);
        assert!(!cost.is_valid);
    }

    #[test]
    fn test_size_limit() {
        let gate = CodeSafetyGate::new(GateConfig {
            max_code_bytes: 16,
            ..Default::default()
        });
        let report = gate.static_scan(CLEAN_SOLVER, CodeType::Algorithm);
        assert!(!report.is_valid);
        assert!(report.ensure_valid().is_err());
    }
}
