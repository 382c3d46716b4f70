use crate::runtime::compliance::InvocationLoggingConfig;

pub trait InvocationLoggingProbe {
    fn fetch_logging_config(&self) -> Result<InvocationLoggingConfig, String>;
}
