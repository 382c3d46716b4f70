pub trait ParameterDirectory {
    /// A plain SSM string parameter, `None` when it does not exist.
    fn string_parameter(&self, name: &str) -> Result<Option<String>, String>;

    /// A comma-separated SSM string-list parameter.
    fn string_list_parameter(&self, name: &str) -> Result<Option<Vec<String>>, String>;
}

pub trait AccountDirectory {
    /// Active member account ids of the organization.
    fn organization_accounts(&self) -> Result<Vec<String>, String>;
}
