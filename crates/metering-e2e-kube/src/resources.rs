//! Metering custom resources and how their status is read.
//!
//! Objects are handled as [`DynamicObject`]s; only the handful of fields the
//! harness needs are extracted here.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use serde_json::Value;

use metering_e2e_core::{DataSourceTable, ReportStatus, ScheduledReportStatus};

pub const METERING_GROUP: &str = "metering.openshift.io";
pub const METERING_VERSION: &str = "v1alpha1";

/// The metering kinds the harness reads or creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteringKind {
    ReportDataSource,
    ReportGenerationQuery,
    Report,
    ScheduledReport,
}

impl MeteringKind {
    pub fn kind(self) -> &'static str {
        match self {
            MeteringKind::ReportDataSource => "ReportDataSource",
            MeteringKind::ReportGenerationQuery => "ReportGenerationQuery",
            MeteringKind::Report => "Report",
            MeteringKind::ScheduledReport => "ScheduledReport",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            MeteringKind::ReportDataSource => "reportdatasources",
            MeteringKind::ReportGenerationQuery => "reportgenerationqueries",
            MeteringKind::Report => "reports",
            MeteringKind::ScheduledReport => "scheduledreports",
        }
    }

    pub fn api_resource(self) -> ApiResource {
        ApiResource {
            group: METERING_GROUP.to_string(),
            version: METERING_VERSION.to_string(),
            api_version: format!("{METERING_GROUP}/{METERING_VERSION}"),
            kind: self.kind().to_string(),
            plural: self.plural().to_string(),
        }
    }
}

fn name_of(obj: &DynamicObject) -> String {
    obj.metadata.name.clone().unwrap_or_default()
}

fn str_at<'a>(obj: &'a DynamicObject, pointer: &str) -> Option<&'a str> {
    obj.data.pointer(pointer).and_then(Value::as_str)
}

fn strings_at(obj: &DynamicObject, pointer: &str) -> Vec<String> {
    obj.data
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `status.tableName` of a ReportDataSource.
pub fn data_source_table(obj: &DynamicObject) -> DataSourceTable {
    DataSourceTable {
        name: name_of(obj),
        table_name: str_at(obj, "/status/tableName")
            .filter(|t| !t.is_empty())
            .map(str::to_string),
    }
}

/// Direct dependencies declared by a ReportGenerationQuery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDependencies {
    pub data_sources: BTreeSet<String>,
    pub queries: BTreeSet<String>,
}

pub fn query_dependencies(obj: &DynamicObject) -> QueryDependencies {
    let mut queries: BTreeSet<String> = strings_at(obj, "/spec/reportQueries").into_iter().collect();
    queries.extend(strings_at(obj, "/spec/dynamicReportQueries"));
    QueryDependencies {
        data_sources: strings_at(obj, "/spec/reportDataSources").into_iter().collect(),
        queries,
    }
}

/// Map a Report's `status.phase` to a [`ReportStatus`].
pub fn report_status(obj: &DynamicObject) -> ReportStatus {
    let phase = str_at(obj, "/status/phase").unwrap_or_default();
    match phase {
        "Finished" => ReportStatus::Finished,
        "Error" => ReportStatus::Failed {
            reason: str_at(obj, "/status/output")
                .filter(|o| !o.is_empty())
                .unwrap_or("report entered the Error phase")
                .to_string(),
        },
        "" => ReportStatus::Pending {
            phase: "<none>".to_string(),
        },
        other => ReportStatus::Pending {
            phase: other.to_string(),
        },
    }
}

pub fn scheduled_report_status(obj: &DynamicObject) -> ScheduledReportStatus {
    ScheduledReportStatus {
        last_report_time: str_at(obj, "/status/lastReportTime")
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc)),
    }
}
