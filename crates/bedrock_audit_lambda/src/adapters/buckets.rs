/// Destination-bucket probes. A bucket with none of the relevant
/// configuration at all reads as `false`, not as an error.
pub trait BucketInspector {
    fn has_expiration_rule(&self, bucket: &str) -> Result<bool, String>;
    fn has_server_side_encryption(&self, bucket: &str) -> Result<bool, String>;
    fn has_access_logging(&self, bucket: &str) -> Result<bool, String>;
    fn has_object_lock(&self, bucket: &str) -> Result<bool, String>;
    fn has_versioning_enabled(&self, bucket: &str) -> Result<bool, String>;
}
