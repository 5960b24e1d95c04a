//! Section 6's configuration record. A builder in the teacher's style: small
//! `with_*` setters returning `Self`, defaults chosen to match the most
//! common spreadsheet host behavior.

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub matrix_detection: bool,
    pub matrix_detection_threshold: u32,
    pub case_sensitive: bool,
    pub function_arg_separator: char,
    pub language: String,
    pub precision_rounding: u32,
    pub smart_rounding: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matrix_detection: true,
            matrix_detection_threshold: 2,
            case_sensitive: false,
            function_arg_separator: ',',
            language: "en".to_string(),
            precision_rounding: 15,
            smart_rounding: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matrix_detection(mut self, on: bool) -> Self {
        self.matrix_detection = on;
        self
    }

    pub fn with_matrix_detection_threshold(mut self, threshold: u32) -> Self {
        assert!(threshold >= 1, "matrix_detection_threshold must be >= 1");
        self.matrix_detection_threshold = threshold;
        self
    }

    pub fn with_case_sensitive(mut self, on: bool) -> Self {
        self.case_sensitive = on;
        self
    }

    pub fn with_function_arg_separator(mut self, sep: char) -> Self {
        self.function_arg_separator = sep;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_precision_rounding(mut self, digits: u32) -> Self {
        self.precision_rounding = digits;
        self
    }

    pub fn with_smart_rounding(mut self, on: bool) -> Self {
        self.smart_rounding = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_common_host_behavior() {
        let cfg = EngineConfig::default();
        assert!(cfg.matrix_detection);
        assert!(!cfg.case_sensitive);
        assert_eq!(cfg.function_arg_separator, ',');
    }

    #[test]
    fn builder_chains_overrides() {
        let cfg = EngineConfig::new()
            .with_matrix_detection(false)
            .with_case_sensitive(true)
            .with_function_arg_separator(';');
        assert!(!cfg.matrix_detection);
        assert!(cfg.case_sensitive);
        assert_eq!(cfg.function_arg_separator, ';');
    }

    #[test]
    #[should_panic]
    fn zero_matrix_threshold_is_rejected() {
        EngineConfig::new().with_matrix_detection_threshold(0);
    }
}
