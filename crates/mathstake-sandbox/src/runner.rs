use crate::error::Result;
use async_trait::async_trait;
use mathstake_types::CodeType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Host functions a program may call back into. Names on the wire match the
/// serde form (`fetch_stock`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FetchStock,
    FetchCrypto,
    FetchWeather,
    FetchRandom,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::FetchStock,
        Capability::FetchCrypto,
        Capability::FetchWeather,
        Capability::FetchRandom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::FetchStock => "fetch_stock",
            Capability::FetchCrypto => "fetch_crypto",
            Capability::FetchWeather => "fetch_weather",
            Capability::FetchRandom => "fetch_random",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One program invocation: call `entry_point(*args)` inside `code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub entry_point: String,
    pub args: Vec<Value>,
    pub capabilities: BTreeSet<Capability>,
}

impl ExecutionRequest {
    /// Request with no host capabilities.
    pub fn new(code: impl Into<String>, entry_point: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            code: code.into(),
            entry_point: entry_point.into(),
            args,
            capabilities: BTreeSet::new(),
        }
    }

    pub fn for_code_type(code: impl Into<String>, code_type: CodeType, args: Vec<Value>) -> Self {
        Self::new(code, code_type.entry_point(), args)
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Serves host calls made by a running program.
///
/// Only invoked for capabilities declared on the request.
#[async_trait]
pub trait HostFunctions: Send + Sync {
    async fn call(&self, capability: Capability, args: &[Value]) -> Result<Value>;
}

/// Host that grants nothing. Used for solvers and cost functions.
pub struct NoHost;

#[async_trait]
impl HostFunctions for NoHost {
    async fn call(&self, capability: Capability, _args: &[Value]) -> Result<Value> {
        Err(crate::error::SandboxError::CapabilityDenied(capability.to_string()))
    }
}

/// Runs a single program to completion and returns its raw result value.
///
/// Implementations do not enforce the wall-clock limit; the executor wraps
/// every run in a timeout and drops the future when it expires.
#[async_trait]
pub trait ProgramRunner: Send + Sync {
    async fn run(&self, request: &ExecutionRequest, host: &dyn HostFunctions) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_wire_names() {
        for cap in Capability::ALL {
            let json = serde_json::to_value(cap).unwrap();
            assert_eq!(json, Value::String(cap.as_str().to_string()));
            assert_eq!(Capability::from_name(cap.as_str()), Some(cap));
        }
        assert_eq!(Capability::from_name("open_socket"), None);
    }

    #[test]
    fn test_request_capabilities() {
        let request = ExecutionRequest::for_code_type("def solve(x): return x", CodeType::Algorithm, vec![])
            .with_capabilities([Capability::FetchStock]);
        assert_eq!(request.entry_point, "solve");
        assert!(request.allows(Capability::FetchStock));
        assert!(!request.allows(Capability::FetchRandom));
    }

    #[tokio::test]
    async fn test_no_host_denies_everything() {
        for cap in Capability::ALL {
            assert!(NoHost.call(cap, &[]).await.is_err());
        }
    }
}
