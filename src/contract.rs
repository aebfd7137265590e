//! Contract tests
//!
//! Replays recorded query fixtures against a candidate schema before it
//! goes live. Each fixture's query must still validate against the
//! candidate's structure; when a [`QueryExecutor`] is wired in, its result
//! must also equal the recorded `expected_result`.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::schema::ParsedSchema;
use crate::sdl::query::QueryDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        f.write_str(name)
    }
}

fn default_variables() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_active() -> bool {
    true
}

/// A recorded query fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTest {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub query: String,
    #[serde(default = "default_variables")]
    pub variables: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_result: Option<Value>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContractTest {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            query: query.into(),
            variables: default_variables(),
            expected_result: None,
            priority: Priority::default(),
            is_active: true,
            description: None,
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_expected_result(mut self, expected: Value) -> Self {
        self.expected_result = Some(expected);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Execution engine hook. The registry never executes queries itself.
pub trait QueryExecutor: Send + Sync {
    fn execute(
        &self,
        schema: &ParsedSchema,
        query: &str,
        variables: &Value,
    ) -> std::result::Result<Value, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractTestResults {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
}

impl ContractTestResults {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

#[derive(Clone, Default)]
pub struct ContractTester {
    executor: Option<Arc<dyn QueryExecutor>>,
}

impl ContractTester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executor(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor: Some(executor),
        }
    }

    /// Run active fixtures against `candidate`, highest priority first
    pub fn run(&self, candidate: &ParsedSchema, fixtures: &[ContractTest]) -> ContractTestResults {
        let mut ordered: Vec<&ContractTest> = fixtures.iter().filter(|t| t.is_active).collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));

        let mut results = ContractTestResults::default();
        for test in ordered {
            let started = Instant::now();
            let error = self.check(candidate, test).err();
            let result = TestResult {
                test_name: test.name.clone(),
                passed: error.is_none(),
                error,
                duration: started.elapsed(),
            };

            results.total += 1;
            if result.passed {
                results.passed += 1;
                debug!(test = %result.test_name, "Contract test passed");
            } else {
                results.failed += 1;
                warn!(
                    test = %result.test_name,
                    priority = %test.priority,
                    error = result.error.as_deref().unwrap_or_default(),
                    "Contract test failed"
                );
            }
            results.results.push(result);
        }

        info!(
            total = results.total,
            passed = results.passed,
            failed = results.failed,
            "Contract tests finished"
        );
        results
    }

    fn check(&self, candidate: &ParsedSchema, test: &ContractTest) -> std::result::Result<(), String> {
        let document = QueryDocument::parse(&test.query).map_err(|e| format!("query does not parse: {}", e))?;

        let mut problems = document.validate(candidate);
        problems.extend(
            document
                .missing_variables(&test.variables)
                .into_iter()
                .map(|name| format!("required variable '${}' not provided", name)),
        );
        if !problems.is_empty() {
            return Err(problems.join("; "));
        }

        if let (Some(executor), Some(expected)) = (&self.executor, &test.expected_result) {
            let actual = executor
                .execute(candidate, &test.query, &test.variables)
                .map_err(|e| format!("execution failed: {}", e))?;
            if &actual != expected {
                return Err(format!("result mismatch: expected {}, got {}", expected, actual));
            }
        }
        Ok(())
    }
}
