//! Test builders for configs and registries.
//!
//! These panic on invalid input rather than returning `Result`.

use std::path::Path;
use std::time::Duration;

use metering_e2e::core::{AdHocCase, HarnessConfig, Registry, ScheduledCase, TestCase};

pub const POLL: Duration = Duration::from_secs(5);
pub const READINESS: Duration = Duration::from_secs(60);
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(300);

/// Config with short, round timings writing artifacts into `dir`.
pub fn test_config(dir: &Path) -> HarnessConfig {
    HarnessConfig {
        report_timeout: REPORT_TIMEOUT,
        output_dir: dir.to_path_buf(),
        enable_aws_billing: false,
        poll_interval: POLL,
        readiness_timeout: READINESS,
        collect_window: Duration::from_secs(600),
    }
}

/// Fluent builder for [`Registry`] fixtures.
///
/// ```rust
/// let registry = RegistryBuilder::new()
///     .ad_hoc("cpu-request", "namespace-cpu-request")
///     .scheduled("cpu-request-hourly", "namespace-cpu-request")
///     .build();
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    cases: Vec<TestCase>,
    timeout: Option<Duration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout applied to cases added after this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn ad_hoc(mut self, name: &str, query: &str) -> Self {
        let case = AdHocCase::simple(name, query, self.case_timeout());
        self.cases.push(TestCase::from(case));
        self
    }

    pub fn skipped(mut self, name: &str, query: &str) -> Self {
        let case = AdHocCase::simple(name, query, self.case_timeout()).skip_if(true);
        self.cases.push(TestCase::from(case));
        self
    }

    pub fn scheduled(mut self, name: &str, query: &str) -> Self {
        let case = ScheduledCase::new(name, query, self.case_timeout());
        self.cases.push(TestCase::from(case));
        self
    }

    pub fn build(self) -> Registry {
        Registry::new(self.cases).expect("valid test registry")
    }

    fn case_timeout(&self) -> Duration {
        self.timeout.unwrap_or(REPORT_TIMEOUT)
    }
}
