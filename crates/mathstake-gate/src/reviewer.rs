use crate::error::Result;
use crate::rules::Severity;
use async_trait::async_trait;
use mathstake_types::CodeType;
use serde::{Deserialize, Serialize};

/// Findings from a semantic (model-backed) code review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    #[serde(default)]
    pub issues: Vec<String>,
    pub severity: Severity,
}

impl ReviewVerdict {
    pub fn safe() -> Self {
        Self {
            issues: Vec::new(),
            severity: Severity::Safe,
        }
    }
}

/// External capability that reviews code beyond what static patterns catch.
///
/// Only consulted when the static pass found nothing dangerous; its verdict
/// can add issues and raise severity but never clear a static finding.
#[async_trait]
pub trait SemanticReviewer: Send + Sync {
    async fn review(&self, code: &str, code_type: CodeType) -> Result<ReviewVerdict>;
}

#[cfg(feature = "http-reviewer")]
pub use http::{HttpReviewerConfig, HttpSemanticReviewer};

#[cfg(feature = "http-reviewer")]
mod http {
    use super::*;
    use crate::error::GateError;
    use std::time::Duration;
    use tracing::debug;

    #[derive(Debug, Clone)]
    pub struct HttpReviewerConfig {
        pub endpoint: String,
        pub timeout_secs: u64,
        pub api_key: Option<String>,
    }

    #[derive(Serialize)]
    struct ReviewRequest<'a> {
        code: &'a str,
        code_type: CodeType,
    }

    /// Posts `{code, code_type}` to a reviewer service and expects
    /// `{issues, severity}` back.
    pub struct HttpSemanticReviewer {
        config: HttpReviewerConfig,
        client: reqwest::Client,
    }

    impl HttpSemanticReviewer {
        pub fn new(config: HttpReviewerConfig) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| GateError::ReviewerUnavailable(e.to_string()))?;
            Ok(Self { config, client })
        }
    }

    #[async_trait]
    impl SemanticReviewer for HttpSemanticReviewer {
        async fn review(&self, code: &str, code_type: CodeType) -> Result<ReviewVerdict> {
            let mut request = self
                .client
                .post(&self.config.endpoint)
                .json(&ReviewRequest { code, code_type });
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }

            let response = request
                .send()
                .await
                .map_err(|e| GateError::ReviewerUnavailable(e.to_string()))?;

            if !response.status().is_success() {
                return Err(GateError::ReviewerUnavailable(format!(
                    "reviewer returned HTTP {}",
                    response.status()
                )));
            }

            let verdict: ReviewVerdict = response
                .json()
                .await
                .map_err(|e| GateError::InvalidResponse(e.to_string()))?;

            debug!(
                code_type = %code_type,
                severity = %verdict.severity,
                issues = verdict.issues.len(),
                "🔍 Semantic review received"
            );
            Ok(verdict)
        }
    }
}
