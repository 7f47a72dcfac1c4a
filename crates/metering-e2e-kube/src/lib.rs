//! metering-e2e-kube — Kubernetes implementation of the harness
//! collaborator.
//!
//! [`KubeFramework`] reads and creates metering custom resources with `kube`
//! and talks to the reporting-operator through the API server's service
//! proxy (see [`reporting_api`]).

pub mod reporting_api;
pub mod resources;

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DurationRound, Utc};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use serde_json::json;
use tracing::{debug, info};

use metering_e2e_core::{
    CollectionResult, DataSourceTable, HarnessError, MeteringFramework, QueryReadiness, ReportRow,
    ReportSpec, ReportStatus, Result, ScheduledReportStatus,
};

use crate::reporting_api::ReportingApi;
use crate::resources::MeteringKind;

/// How to reach the metering deployment under test.
#[derive(Debug, Clone)]
pub struct KubeOptions {
    pub namespace: String,
    /// Explicit kubeconfig; falls back to the usual in-cluster / `$KUBECONFIG`
    /// inference when `None`.
    pub kubeconfig: Option<PathBuf>,
    pub https_api: bool,
    pub collect_window: Duration,
}

pub struct KubeFramework {
    client: Client,
    namespace: String,
    reporting: ReportingApi,
    collect_window: Duration,
}

impl KubeFramework {
    /// Build a client from the options' kubeconfig and wrap it.
    pub async fn connect(options: &KubeOptions) -> Result<Self> {
        let config = match &options.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|err| HarnessError::cluster("read kubeconfig", format!("{}: {err}", path.display())))?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|err| HarnessError::cluster("load kubeconfig", err.to_string()))?
            }
            None => kube::Config::infer()
                .await
                .map_err(|err| HarnessError::cluster("infer kube config", err.to_string()))?,
        };
        info!(cluster = %config.cluster_url, namespace = %options.namespace, "connecting to cluster");
        let client = Client::try_from(config)
            .map_err(|err| HarnessError::cluster("create client", err.to_string()))?;
        Ok(Self::new(client, options))
    }

    pub fn new(client: Client, options: &KubeOptions) -> Self {
        Self {
            reporting: ReportingApi::new(client.clone(), &options.namespace, options.https_api),
            client,
            namespace: options.namespace.clone(),
            collect_window: options.collect_window,
        }
    }

    fn api(&self, kind: MeteringKind) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &kind.api_resource())
    }

    async fn get(&self, kind: MeteringKind, name: &str) -> Result<DynamicObject> {
        self.api(kind)
            .get(name)
            .await
            .map_err(|err| HarnessError::cluster("get object", format!("{} {name}: {err}", kind.kind())))
    }

    /// Walk a generation query's dependency graph. Queries that do not exist
    /// are returned in `missing` instead of failing the walk.
    async fn resolve(&self, query: &str) -> Result<Resolved> {
        let api = self.api(MeteringKind::ReportGenerationQuery);
        let mut resolved = Resolved::default();
        let mut visited = BTreeSet::new();
        let mut stack = vec![query.to_string()];

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let found = api.get_opt(&name).await.map_err(|err| {
                HarnessError::cluster("get object", format!("ReportGenerationQuery {name}: {err}"))
            })?;
            match found {
                Some(obj) => {
                    let deps = resources::query_dependencies(&obj);
                    resolved.data_sources.extend(deps.data_sources);
                    stack.extend(deps.queries.into_iter().filter(|q| !visited.contains(q)));
                }
                None => resolved.missing.push(format!("ReportGenerationQuery {name} not found")),
            }
        }
        debug!(query, data_sources = ?resolved.data_sources, "resolved query dependencies");
        Ok(resolved)
    }
}

#[derive(Debug, Default)]
struct Resolved {
    data_sources: BTreeSet<String>,
    missing: Vec<String>,
}

#[async_trait]
impl MeteringFramework for KubeFramework {
    async fn data_source_tables(&self) -> Result<Vec<DataSourceTable>> {
        let list = self
            .api(MeteringKind::ReportDataSource)
            .list(&ListParams::default())
            .await
            .map_err(|err| HarnessError::cluster("list ReportDataSources", err.to_string()))?;
        Ok(list.items.iter().map(resources::data_source_table).collect())
    }

    async fn generation_query_readiness(&self, query: &str) -> Result<QueryReadiness> {
        let resolved = self.resolve(query).await?;
        let tables: HashMap<String, DataSourceTable> = self
            .data_source_tables()
            .await?
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        let mut unmet = resolved.missing;
        for ds in &resolved.data_sources {
            match tables.get(ds) {
                Some(table) if table.has_table() => {}
                Some(_) => unmet.push(format!("ReportDataSource {ds} has no table")),
                None => unmet.push(format!("ReportDataSource {ds} not found")),
            }
        }

        Ok(if unmet.is_empty() {
            QueryReadiness::Ready
        } else {
            QueryReadiness::NotReady {
                reason: unmet.join("; "),
            }
        })
    }

    async fn collect_metrics_once(&self) -> Result<CollectionResult> {
        let window = chrono::Duration::from_std(self.collect_window).map_err(|err| {
            HarnessError::InvalidConfig {
                details: format!("collect window: {err}"),
            }
        })?;
        let period_end = Utc::now()
            .duration_trunc(chrono::Duration::minutes(1))
            .map_err(|err| HarnessError::Collection {
                details: format!("cannot round collection end: {err}"),
            })?;
        let period_start = period_end - window;

        let response = self.reporting.collect(period_start, period_end).await?;
        Ok(CollectionResult::new(period_start, period_end, response))
    }

    async fn query_data_sources(&self, query: &str) -> Result<Vec<String>> {
        let resolved = self.resolve(query).await?;
        if !resolved.missing.is_empty() {
            return Err(HarnessError::cluster("resolve query", resolved.missing.join("; ")));
        }
        Ok(resolved.data_sources.into_iter().collect())
    }

    async fn create_report(&self, spec: &ReportSpec) -> Result<()> {
        let api = self.api(MeteringKind::Report);
        match api.delete(&spec.name, &DeleteParams::default()).await {
            Ok(_) => debug!(report = %spec.name, "deleted stale report"),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(err) => {
                return Err(HarnessError::cluster("delete report", format!("{}: {err}", spec.name)))
            }
        }

        let report = DynamicObject::new(&spec.name, &MeteringKind::Report.api_resource())
            .within(&self.namespace)
            .data(json!({
                "spec": {
                    "generationQuery": spec.generation_query,
                    "reportingStart": spec.reporting_start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    "reportingEnd": spec.reporting_end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    "runImmediately": spec.run_immediately,
                }
            }));
        api.create(&PostParams::default(), &report)
            .await
            .map_err(|err| HarnessError::cluster("create report", format!("{}: {err}", spec.name)))?;
        info!(report = %spec.name, query = %spec.generation_query, "report created");
        Ok(())
    }

    async fn report_status(&self, name: &str) -> Result<ReportStatus> {
        let obj = self.get(MeteringKind::Report, name).await?;
        Ok(resources::report_status(&obj))
    }

    async fn report_results(&self, name: &str) -> Result<Vec<ReportRow>> {
        self.reporting.report_results(name).await
    }

    async fn scheduled_report_status(&self, name: &str) -> Result<ScheduledReportStatus> {
        let obj = self.get(MeteringKind::ScheduledReport, name).await?;
        Ok(resources::scheduled_report_status(&obj))
    }

    async fn scheduled_report_results(&self, name: &str) -> Result<Vec<ReportRow>> {
        self.reporting.scheduled_report_results(name).await
    }
}
