/// Engine-wide tunables shared by the pagination and filter layers.
///
/// Values are fixed before any resource is registered and never change for
/// the life of the process, so one config can be shared freely across
/// concurrently handled requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Accepted input formats for `Date` filter parameters, strftime-style.
    pub date_formats: Vec<String>,
    /// Accepted input formats for `DateTime` filter parameters.
    pub datetime_formats: Vec<String>,
    /// Accepted input formats for `Time` filter parameters.
    pub time_formats: Vec<String>,
    /// Limit applied to limit/offset pagination when the request omits one.
    /// `None` means "no limiting unless requested".
    pub default_limit: Option<u64>,
    /// Hard cap on the requested limit. `None` means uncapped.
    pub max_limit: Option<u64>,
    /// Page size used by page-number pagination when the request omits one.
    pub default_page_size: u64,
    /// Hard cap on the requested page size. `None` means uncapped.
    pub max_page_size: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            date_formats: vec!["%Y-%m-%d".to_string()],
            datetime_formats: vec![
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
            ],
            time_formats: vec!["%H:%M:%S".to_string()],
            default_limit: None,
            max_limit: None,
            default_page_size: 1000,
            max_page_size: None,
        }
    }
}

impl EngineConfig {
    /// Profile for a public-facing API: every page knob capped.
    pub fn api_defaults() -> Self {
        Self {
            default_limit: Some(100),
            max_limit: Some(1000),
            default_page_size: 100,
            max_page_size: Some(1000),
            ..Self::default()
        }
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_formats.push(format.into());
        self
    }

    pub fn with_datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_formats.push(format.into());
        self
    }

    pub fn with_time_format(mut self, format: impl Into<String>) -> Self {
        self.time_formats.push(format.into());
        self
    }

    pub fn with_default_limit(mut self, limit: Option<u64>) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_max_limit(mut self, limit: Option<u64>) -> Self {
        self.max_limit = limit;
        self
    }

    pub fn with_default_page_size(mut self, page_size: u64) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub fn with_max_page_size(mut self, page_size: Option<u64>) -> Self {
        self.max_page_size = page_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn default_config_is_uncapped() {
        let config = EngineConfig::default();
        assert_eq!(config.default_limit, None);
        assert_eq!(config.max_limit, None);
        assert_eq!(config.default_page_size, 1000);
        assert_eq!(config.date_formats, vec!["%Y-%m-%d".to_string()]);
    }

    #[test]
    fn api_defaults_cap_everything() {
        let config = EngineConfig::api_defaults();
        assert_eq!(config.default_limit, Some(100));
        assert_eq!(config.max_limit, Some(1000));
        assert_eq!(config.max_page_size, Some(1000));
    }

    #[test]
    fn builder_methods_accumulate() {
        let config = EngineConfig::default()
            .with_date_format("%d/%m/%Y")
            .with_default_limit(Some(25));
        assert_eq!(config.date_formats.len(), 2);
        assert_eq!(config.default_limit, Some(25));
    }
}
