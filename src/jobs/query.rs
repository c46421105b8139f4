//! SQL builders for each job family.
//!
//! Queries target a GA4 BigQuery export dataset (`events_*` tables). Column
//! aliases match what the result finalizer reads.

use crate::config::AuditRule;
use crate::jobs::types::JobFamily;

/// Where the GA4 export lives.
#[derive(Debug, Clone)]
pub struct QueryTarget {
    pub project_id: String,
    pub dataset: String,
    pub lookback_days: u32,
}

impl QueryTarget {
    fn events_table(&self) -> String {
        format!("`{}.{}.events_*`", self.project_id, self.dataset)
    }
}

/// Build the query for a job family.
#[must_use]
pub fn build_query(family: JobFamily, target: &QueryTarget, rules: &[AuditRule]) -> String {
    match family {
        JobFamily::Heartbeat => heartbeat_sql(target),
        JobFamily::DimensionalHealth => dimensional_health_sql(target, rules),
        JobFamily::DataInventory => data_inventory_sql(target),
        JobFamily::SmartDiscovery => smart_discovery_sql(target),
    }
}

/// Yesterday's event counts against the trailing daily average.
#[must_use]
pub fn heartbeat_sql(target: &QueryTarget) -> String {
    let days = target.lookback_days.max(1);
    format!(
        "WITH daily AS (
  SELECT event_name, PARSE_DATE('%Y%m%d', event_date) AS day, COUNT(*) AS n
  FROM {table}
  WHERE _TABLE_SUFFIX BETWEEN FORMAT_DATE('%Y%m%d', DATE_SUB(CURRENT_DATE(), INTERVAL {window} DAY))
    AND FORMAT_DATE('%Y%m%d', DATE_SUB(CURRENT_DATE(), INTERVAL 1 DAY))
  GROUP BY event_name, day
)
SELECT
  event_name,
  SUM(IF(day = DATE_SUB(CURRENT_DATE(), INTERVAL 1 DAY), n, 0)) AS yesterday_count,
  SUM(IF(day < DATE_SUB(CURRENT_DATE(), INTERVAL 1 DAY), n, 0)) / {days} AS avg_7d_count
FROM daily
GROUP BY event_name
ORDER BY event_name",
        table = target.events_table(),
        window = days + 1,
    )
}

/// Parameter fill rates for the events named by active audit rules.
///
/// With no active rules every event/parameter pair is measured.
#[must_use]
pub fn dimensional_health_sql(target: &QueryTarget, rules: &[AuditRule]) -> String {
    let events: Vec<String> = rules
        .iter()
        .filter(|r| r.active)
        .map(|r| format!("'{}'", r.event_name.replace('\'', "\\'")))
        .collect();
    let event_filter = if events.is_empty() {
        String::new()
    } else {
        format!("\n  AND event_name IN ({})", events.join(", "))
    };

    format!(
        "SELECT
  event_name,
  ep.key AS parameter_name,
  COUNT(*) AS total_events,
  COUNTIF(COALESCE(ep.value.string_value, CAST(ep.value.int_value AS STRING),
    CAST(ep.value.double_value AS STRING)) IS NOT NULL) AS filled_events
FROM {table}, UNNEST(event_params) AS ep
WHERE _TABLE_SUFFIX >= FORMAT_DATE('%Y%m%d', DATE_SUB(CURRENT_DATE(), INTERVAL {days} DAY)){event_filter}
GROUP BY event_name, parameter_name
ORDER BY event_name, parameter_name",
        table = target.events_table(),
        days = target.lookback_days.max(1),
    )
}

/// Table inventory for the export dataset.
#[must_use]
pub fn data_inventory_sql(target: &QueryTarget) -> String {
    format!(
        "SELECT
  dataset_id AS dataset,
  table_id AS table,
  row_count,
  size_bytes,
  TIMESTAMP_MILLIS(last_modified_time) AS last_modified
FROM `{project}.{dataset}.__TABLES__`
ORDER BY table_id",
        project = target.project_id,
        dataset = target.dataset,
    )
}

/// Every event/parameter pair seen in the look-back window.
#[must_use]
pub fn smart_discovery_sql(target: &QueryTarget) -> String {
    format!(
        "SELECT event_name, ep.key AS parameter_name, COUNT(*) AS occurrences
FROM {table}, UNNEST(event_params) AS ep
WHERE _TABLE_SUFFIX >= FORMAT_DATE('%Y%m%d', DATE_SUB(CURRENT_DATE(), INTERVAL {days} DAY))
GROUP BY event_name, parameter_name
ORDER BY occurrences DESC",
        table = target.events_table(),
        days = target.lookback_days.max(1),
    )
}
