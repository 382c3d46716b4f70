use std::collections::BTreeMap;
use std::time::Duration;

use aws_config::SdkConfig;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, KeySchemaElement, KeyType, ProvisionedThroughput,
    ReturnValue, ScalarAttributeType, TableStatus,
};

use crate::adapters::state_store::{StateStore, TableOutcome};
use crate::runtime::state::{
    update_expression, StateRecord, STATE_PARTITION_KEY, STATE_SORT_KEY,
};

use super::{absent_on, block_on};

const READ_CAPACITY_UNITS: i64 = 5;
const WRITE_CAPACITY_UNITS: i64 = 5;
const ACTIVATION_MAX_ATTEMPTS: usize = 60;
const ACTIVATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct DynamoStateStore {
    dynamodb: aws_sdk_dynamodb::Client,
}

impl DynamoStateStore {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            dynamodb: aws_sdk_dynamodb::Client::new(config),
        }
    }

    fn table_status(&self, table_name: &str) -> Result<Option<TableStatus>, String> {
        let result = block_on(async {
            self.dynamodb
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(|error| format!("failed to describe table '{table_name}': {error}"))
        });
        Ok(absent_on(result, "ResourceNotFoundException")?
            .and_then(|output| output.table().and_then(|table| table.table_status().cloned())))
    }

    fn create_table(&self, table_name: &str) -> Result<(), String> {
        block_on(async {
            let partition_key = KeySchemaElement::builder()
                .attribute_name(STATE_PARTITION_KEY)
                .key_type(KeyType::Hash)
                .build()
                .map_err(|error| format!("failed to build key schema: {error}"))?;
            let sort_key = KeySchemaElement::builder()
                .attribute_name(STATE_SORT_KEY)
                .key_type(KeyType::Range)
                .build()
                .map_err(|error| format!("failed to build key schema: {error}"))?;
            let partition_attribute = AttributeDefinition::builder()
                .attribute_name(STATE_PARTITION_KEY)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|error| format!("failed to build attribute definition: {error}"))?;
            let sort_attribute = AttributeDefinition::builder()
                .attribute_name(STATE_SORT_KEY)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|error| format!("failed to build attribute definition: {error}"))?;
            let throughput = ProvisionedThroughput::builder()
                .read_capacity_units(READ_CAPACITY_UNITS)
                .write_capacity_units(WRITE_CAPACITY_UNITS)
                .build()
                .map_err(|error| format!("failed to build provisioned throughput: {error}"))?;

            self.dynamodb
                .create_table()
                .table_name(table_name)
                .key_schema(partition_key)
                .key_schema(sort_key)
                .attribute_definitions(partition_attribute)
                .attribute_definitions(sort_attribute)
                .provisioned_throughput(throughput)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to create table '{table_name}': {error}"))
        })
    }

    fn wait_for_active(&self, table_name: &str) -> Result<(), String> {
        for _ in 0..ACTIVATION_MAX_ATTEMPTS {
            if let Some(TableStatus::Active) = self.table_status(table_name)? {
                return Ok(());
            }
            block_on(tokio::time::sleep(ACTIVATION_POLL_INTERVAL));
        }
        Err(format!(
            "timed out waiting for table '{table_name}' to become active"
        ))
    }

    fn record_from_item(item: &std::collections::HashMap<String, AttributeValue>) -> StateRecord {
        let mut solution_name = String::new();
        let mut record_id = String::new();
        let mut date_time = String::new();
        let mut attributes = BTreeMap::new();
        for (name, value) in item {
            let Ok(text) = value.as_s() else {
                continue;
            };
            match name.as_str() {
                STATE_PARTITION_KEY => solution_name = text.clone(),
                STATE_SORT_KEY => record_id = text.clone(),
                "date_time" => date_time = text.clone(),
                other => {
                    attributes.insert(other.to_string(), text.clone());
                }
            }
        }
        StateRecord {
            solution_name,
            record_id,
            date_time,
            attributes,
        }
    }
}

impl StateStore for DynamoStateStore {
    fn ensure_table(&self, table_name: &str) -> Result<TableOutcome, String> {
        if self.table_status(table_name)?.is_some() {
            self.wait_for_active(table_name)?;
            return Ok(TableOutcome::AlreadyPresent);
        }

        self.create_table(table_name)?;
        self.wait_for_active(table_name)?;
        Ok(TableOutcome::Created)
    }

    fn insert_record(&self, table_name: &str, record: &StateRecord) -> Result<(), String> {
        block_on(async {
            let mut request = self
                .dynamodb
                .put_item()
                .table_name(table_name)
                .item(
                    STATE_PARTITION_KEY,
                    AttributeValue::S(record.solution_name.clone()),
                )
                .item(STATE_SORT_KEY, AttributeValue::S(record.record_id.clone()))
                .item("date_time", AttributeValue::S(record.date_time.clone()));
            for (name, value) in &record.attributes {
                request = request.item(name, AttributeValue::S(value.clone()));
            }
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to insert state record: {error}"))
        })
    }

    fn update_record(
        &self,
        table_name: &str,
        solution_name: &str,
        record_id: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), String> {
        let expression = update_expression(attributes.keys().map(String::as_str));
        block_on(async {
            let mut request = self
                .dynamodb
                .update_item()
                .table_name(table_name)
                .key(
                    STATE_PARTITION_KEY,
                    AttributeValue::S(solution_name.to_string()),
                )
                .key(STATE_SORT_KEY, AttributeValue::S(record_id.to_string()))
                .update_expression(expression)
                .return_values(ReturnValue::UpdatedNew);
            for (name, value) in attributes {
                request = request
                    .expression_attribute_values(format!(":{name}"), AttributeValue::S(value.clone()));
            }
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to update state record '{record_id}': {error}"))
        })
    }

    fn find_record(
        &self,
        table_name: &str,
        solution_name: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<Option<StateRecord>, String> {
        block_on(async {
            let filter_expression: Vec<String> = filters
                .keys()
                .map(|name| format!("{name} = :{name}"))
                .collect();

            let mut request = self
                .dynamodb
                .query()
                .table_name(table_name)
                .key_condition_expression(format!("{STATE_PARTITION_KEY} = :{STATE_PARTITION_KEY}"))
                .expression_attribute_values(
                    format!(":{STATE_PARTITION_KEY}"),
                    AttributeValue::S(solution_name.to_string()),
                );
            if !filter_expression.is_empty() {
                request = request.filter_expression(filter_expression.join(" AND "));
                for (name, value) in filters {
                    request = request.expression_attribute_values(
                        format!(":{name}"),
                        AttributeValue::S(value.clone()),
                    );
                }
            }

            let output = request
                .send()
                .await
                .map_err(|error| format!("failed to query state records: {error}"))?;

            let items = output.items();
            if items.len() > 1 {
                tracing::warn!(
                    table = table_name,
                    matches = items.len(),
                    "more than one state record matched; returning the first"
                );
            }
            Ok(items.first().map(Self::record_from_item))
        })
    }

    fn distinct_solutions_and_accounts(
        &self,
        table_name: &str,
    ) -> Result<(Vec<String>, Vec<String>), String> {
        block_on(async {
            let output = self
                .dynamodb
                .scan()
                .table_name(table_name)
                .send()
                .await
                .map_err(|error| format!("failed to scan state table: {error}"))?;

            let records: Vec<StateRecord> =
                output.items().iter().map(Self::record_from_item).collect();
            let solutions: Vec<String> = records
                .iter()
                .map(|record| record.solution_name.clone())
                .collect();
            let accounts: Vec<String> = records
                .iter()
                .filter_map(|record| record.attributes.get("account").cloned())
                .collect();
            Ok((
                crate::runtime::state::unique_preserving_order(&solutions),
                crate::runtime::state::unique_preserving_order(&accounts),
            ))
        })
    }
}
