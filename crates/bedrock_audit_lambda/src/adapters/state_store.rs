use std::collections::BTreeMap;

use crate::runtime::state::StateRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    Created,
    AlreadyPresent,
}

pub trait StateStore {
    /// Creates the table when absent and waits (bounded) until it is
    /// ACTIVE.
    fn ensure_table(&self, table_name: &str) -> Result<TableOutcome, String>;

    fn insert_record(&self, table_name: &str, record: &StateRecord) -> Result<(), String>;

    fn update_record(
        &self,
        table_name: &str,
        solution_name: &str,
        record_id: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), String>;

    /// First record for the solution matching every filter attribute.
    fn find_record(
        &self,
        table_name: &str,
        solution_name: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<Option<StateRecord>, String>;

    /// Distinct solution names and account attributes across the table.
    fn distinct_solutions_and_accounts(
        &self,
        table_name: &str,
    ) -> Result<(Vec<String>, Vec<String>), String>;
}
