pub trait CodeStager {
    /// Downloads the artifact bundle and stages one zip object per rule
    /// into the staging bucket. Returns the staged object keys.
    fn stage_rule_code(
        &self,
        archive_url: &str,
        staging_bucket: &str,
        rule_names: &[&str],
    ) -> Result<Vec<String>, String>;
}
