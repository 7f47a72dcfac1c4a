//! Test case registry.
//!
//! Cases come in two closed variants. An ad-hoc case can *construct* a report
//! (through its [`ReportFactory`]) and then fetch it; a scheduled case can only
//! fetch a report that already exists in the cluster. Skipping is decided once,
//! when the registry is built, and a skipped case is invisible to every later
//! stage.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::types::{CaseKind, CollectionResult, ReportSpec};

// ---------------------------------------------------------------------------
// Report construction strategies
// ---------------------------------------------------------------------------

/// Builds the Report object an ad-hoc case will create.
pub trait ReportFactory: Send + Sync + std::fmt::Debug {
    /// Short strategy name, used in logs.
    fn strategy(&self) -> &'static str;

    /// Build a report named `name` over `query_name`, scoped to the
    /// collection window.
    fn build(&self, name: &str, query_name: &str, collection: &CollectionResult) -> ReportSpec;
}

/// A report over exactly the collection window that runs as soon as it is
/// created.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleReport;

impl ReportFactory for SimpleReport {
    fn strategy(&self) -> &'static str {
        "simple"
    }

    fn build(&self, name: &str, query_name: &str, collection: &CollectionResult) -> ReportSpec {
        ReportSpec {
            name: name.to_string(),
            generation_query: query_name.to_string(),
            reporting_start: collection.period_start(),
            reporting_end: collection.period_end(),
            run_immediately: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Case variants
// ---------------------------------------------------------------------------

/// A report created by the harness for this case alone.
#[derive(Debug, Clone)]
pub struct AdHocCase {
    pub name: String,
    pub query_name: String,
    pub factory: Arc<dyn ReportFactory>,
    /// Bounds create + wait + fetch + validate.
    pub timeout: Duration,
    pub skip: bool,
}

impl AdHocCase {
    /// An ad-hoc case built with the [`SimpleReport`] strategy.
    pub fn simple(name: impl Into<String>, query_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            query_name: query_name.into(),
            factory: Arc::new(SimpleReport),
            timeout,
            skip: false,
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn ReportFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn skip_if(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }
}

/// A report provisioned out-of-band that the harness only inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledCase {
    pub name: String,
    pub query_name: String,
    pub timeout: Duration,
}

impl ScheduledCase {
    pub fn new(name: impl Into<String>, query_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            query_name: query_name.into(),
            timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TestCase {
    AdHoc(AdHocCase),
    Scheduled(ScheduledCase),
}

impl TestCase {
    pub fn name(&self) -> &str {
        match self {
            TestCase::AdHoc(c) => &c.name,
            TestCase::Scheduled(c) => &c.name,
        }
    }

    pub fn query_name(&self) -> &str {
        match self {
            TestCase::AdHoc(c) => &c.query_name,
            TestCase::Scheduled(c) => &c.query_name,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            TestCase::AdHoc(c) => c.timeout,
            TestCase::Scheduled(c) => c.timeout,
        }
    }

    pub fn kind(&self) -> CaseKind {
        match self {
            TestCase::AdHoc(_) => CaseKind::AdHoc,
            TestCase::Scheduled(_) => CaseKind::Scheduled,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TestCase::AdHoc(c) if c.skip)
    }
}

impl From<AdHocCase> for TestCase {
    fn from(case: AdHocCase) -> Self {
        TestCase::AdHoc(case)
    }
}

impl From<ScheduledCase> for TestCase {
    fn from(case: ScheduledCase) -> Self {
        TestCase::Scheduled(case)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable list of verification cases for one run.
#[derive(Debug, Clone)]
pub struct Registry {
    cases: Vec<TestCase>,
}

impl Registry {
    /// Build a registry. Case names must be unique within a kind because each
    /// name is also the name of a cluster object and of an artifact file.
    /// Queries of skipped cases are never used and so never validated.
    pub fn new(cases: impl IntoIterator<Item = TestCase>) -> Result<Self> {
        let cases: Vec<TestCase> = cases.into_iter().collect();
        let mut seen = HashSet::new();
        for case in &cases {
            if case.name().is_empty() {
                return Err(HarnessError::InvalidConfig {
                    details: format!("{} case with query {:?} needs a name", case.kind(), case.query_name()),
                });
            }
            if !case.is_skipped() && case.query_name().is_empty() {
                return Err(HarnessError::InvalidConfig {
                    details: format!("case {:?} needs a query", case.name()),
                });
            }
            if !seen.insert((case.kind(), case.name())) {
                return Err(HarnessError::InvalidConfig {
                    details: format!("duplicate {} case {:?}", case.kind(), case.name()),
                });
            }
        }
        Ok(Self { cases })
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Cases that take part in the run.
    pub fn active(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter().filter(|c| !c.is_skipped())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter().filter(|c| c.is_skipped())
    }

    pub fn ad_hoc(&self) -> impl Iterator<Item = &AdHocCase> {
        self.active().filter_map(|c| match c {
            TestCase::AdHoc(c) => Some(c),
            TestCase::Scheduled(_) => None,
        })
    }

    pub fn scheduled(&self) -> impl Iterator<Item = &ScheduledCase> {
        self.active().filter_map(|c| match c {
            TestCase::Scheduled(c) => Some(c),
            TestCase::AdHoc(_) => None,
        })
    }

    /// Deduplicated, sorted query names of every active case. This exact set
    /// feeds both the readiness wait and the data-presence assertion.
    pub fn query_names(&self) -> Vec<String> {
        self.active()
            .map(|c| c.query_name().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Built-in cases
// ---------------------------------------------------------------------------

/// The standard set of metering report cases.
///
/// Queries that aggregate over more data get an extra minute on top of the
/// configured base timeout. AWS billing cases are skipped unless enabled.
pub fn default_registry(config: &HarnessConfig) -> Result<Registry> {
    let base = config.report_timeout;
    let slow = base
        .checked_add(Duration::from_secs(60))
        .ok_or_else(|| HarnessError::InvalidConfig {
            details: format!("report timeout {base:?} is out of range"),
        })?;
    let skip_billing = !config.enable_aws_billing;

    // (query, timeout, skip)
    let ad_hoc: [(&str, Duration, bool); 23] = [
        ("namespace-cpu-request", base, false),
        ("namespace-cpu-usage", base, false),
        ("namespace-memory-request", slow, false),
        ("namespace-persistentvolumeclaim-request", slow, false),
        ("namespace-memory-usage", slow, false),
        ("pod-cpu-request", base, false),
        ("pod-cpu-usage", base, false),
        ("pod-memory-request", base, false),
        ("pod-memory-usage", base, false),
        ("pod-memory-request-vs-node-memory-allocatable", slow, false),
        ("persistentvolumeclaim-request", slow, false),
        ("node-cpu-utilization", base, false),
        ("node-memory-utilization", base, false),
        ("pod-cpu-request-aws", base, skip_billing),
        ("pod-memory-request-aws", base, skip_billing),
        ("cluster-persistentvolumeclaim-request", base, false),
        ("cluster-cpu-capacity", base, false),
        ("cluster-memory-capacity", base, false),
        ("cluster-cpu-usage", base, false),
        ("cluster-memory-usage", base, false),
        ("cluster-cpu-utilization", base, false),
        ("cluster-memory-utilization", base, false),
        ("aws-ec2-cluster-cost", base, skip_billing),
    ];

    let cases = ad_hoc
        .into_iter()
        .map(|(query, timeout, skip)| TestCase::from(AdHocCase::simple(query, query, timeout).skip_if(skip)))
        .chain(std::iter::once(TestCase::from(ScheduledCase::new(
            "namespace-cpu-request-hourly",
            "namespace-cpu-request",
            base,
        ))));

    Registry::new(cases)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
