//! Client for the reporting-operator HTTP API.
//!
//! The operator's service is not exposed outside the cluster, so every call
//! goes through the API server's service proxy:
//!
//! ```text
//! /api/v1/namespaces/{ns}/services/{scheme}:reporting-operator:http/proxy/{endpoint}
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use hyper::{Method, Request};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use metering_e2e_core::{CollectResponse, HarnessError, ReportRow, Result};

pub const REPORTING_OPERATOR_SERVICE: &str = "reporting-operator";
const SERVICE_PORT: &str = "http";

pub const COLLECT_ENDPOINT: &str = "/api/v1/datasources/prometheus/collect";
pub const REPORT_RESULTS_ENDPOINT: &str = "/api/v1/reports/get";
pub const SCHEDULED_REPORT_RESULTS_ENDPOINT: &str = "/api/v1/scheduledreports/get";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectRequest {
    start_time: String,
    end_time: String,
}

#[derive(Clone)]
pub struct ReportingApi {
    client: Client,
    namespace: String,
    scheme: &'static str,
}

impl ReportingApi {
    /// `https_api` selects the scheme the proxy uses to reach the operator.
    pub fn new(client: Client, namespace: impl Into<String>, https_api: bool) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            scheme: if https_api { "https" } else { "http" },
        }
    }

    /// Service-proxy path for `endpoint` with the given query parameters.
    pub fn proxy_path(&self, endpoint: &str, query: &[(&str, &str)]) -> String {
        let mut path = format!(
            "/api/v1/namespaces/{}/services/{}:{}:{}/proxy{}",
            self.namespace, self.scheme, REPORTING_OPERATOR_SERVICE, SERVICE_PORT, endpoint
        );
        if !query.is_empty() {
            let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
            path.push('?');
            path.push_str(&pairs.join("&"));
        }
        path
    }

    /// Import metrics for `[start, end]` into every data source.
    pub async fn collect(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<CollectResponse> {
        let body = CollectRequest {
            start_time: start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end_time: end.to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        self.send(Method::POST, &self.proxy_path(COLLECT_ENDPOINT, &[]), Some(&body))
            .await
            .map_err(|err| HarnessError::Collection {
                details: err.to_string(),
            })
    }

    pub async fn report_results(&self, name: &str) -> Result<Vec<ReportRow>> {
        self.results(REPORT_RESULTS_ENDPOINT, name).await
    }

    pub async fn scheduled_report_results(&self, name: &str) -> Result<Vec<ReportRow>> {
        self.results(SCHEDULED_REPORT_RESULTS_ENDPOINT, name).await
    }

    async fn results(&self, endpoint: &str, name: &str) -> Result<Vec<ReportRow>> {
        let path = self.proxy_path(
            endpoint,
            &[("name", name), ("namespace", &self.namespace), ("format", "json")],
        );
        self.send::<(), _>(Method::GET, &path, None).await
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let payload = match body {
            Some(body) => serde_json::to_vec(body)?,
            None => Vec::new(),
        };
        let request = Request::builder()
            .method(method.clone())
            .uri(path)
            .header("Content-Type", "application/json")
            .body(payload)
            .map_err(|err| HarnessError::cluster("build reporting API request", err.to_string()))?;

        debug!(%method, path, "reporting API request");
        let text = self
            .client
            .request_text(request)
            .await
            .map_err(|err| HarnessError::cluster("reporting API request", format!("{method} {path}: {err}")))?;
        serde_json::from_str(&text).map_err(|err| HarnessError::Serialization {
            context: "reporting API response",
            details: format!("{path}: {err}"),
        })
    }
}
