#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown {kind}: '{value}'. Valid values: {valid}")]
    UnknownValue {
        kind: &'static str,
        value: String,
        valid: String,
    },
}

impl CoreError {
    /// Build an [`UnknownValue`](Self::UnknownValue) error listing the accepted values.
    pub fn unknown(kind: &'static str, value: &str, valid: &[&str]) -> Self {
        Self::UnknownValue {
            kind,
            value: value.to_string(),
            valid: valid.join(", "),
        }
    }
}
