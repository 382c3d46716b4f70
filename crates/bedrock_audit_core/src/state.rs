use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATE_PARTITION_KEY: &str = "solution_name";
pub const STATE_SORT_KEY: &str = "record_id";

pub const RECORD_ID_LEN: usize = 8;
pub const RECORD_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Compact sortable timestamp used for the `date_time` attribute.
pub const DATE_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

pub fn timestamp_string(when: &DateTime<Utc>) -> String {
    when.format(DATE_TIME_FORMAT).to_string()
}

/// One deployment-state record. Beyond the table keys and the timestamp,
/// attributes are free-form strings (account, region, resource ARNs).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateRecord {
    pub solution_name: String,
    pub record_id: String,
    pub date_time: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

/// Builds a DynamoDB update expression of the form `set a=:a, b=:b` over
/// the given attribute names.
pub fn update_expression<'a>(attribute_names: impl IntoIterator<Item = &'a str>) -> String {
    let clauses: Vec<String> = attribute_names
        .into_iter()
        .map(|name| format!("{name}=:{name}"))
        .collect();
    format!("set {}", clauses.join(", "))
}

/// Deduplicates while preserving first-seen order.
pub fn unique_preserving_order(values: &[String]) -> Vec<String> {
    let mut unique = Vec::new();
    for value in values {
        if !unique.contains(value) {
            unique.push(value.clone());
        }
    }
    unique
}
