use crate::runtime::compliance::LogGroupFacts;

pub trait LogGroupInspector {
    /// Facts for the first log group matching the prefix, `None` when no
    /// group matches.
    fn log_group_facts(&self, name_prefix: &str) -> Result<Option<LogGroupFacts>, String>;
}
