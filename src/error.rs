use thiserror::Error;

/// Fatal failures. Per-span rejections are not errors; see `measurement::Rejection`.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("cannot {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot {context} as JSON: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot {context} as CSV: {source}")]
    Csv {
        context: &'static str,
        #[source]
        source: csv::Error,
    },
    /// A value in a text table (pedestals, seed widths) that does not parse.
    #[error("{table}, line {line}: {message}")]
    Parse {
        table: &'static str,
        line: usize,
        message: String,
    },
    #[error("{solver} solve requested without any accepted measurement")]
    NoMeasurements { solver: &'static str },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl CalibrationError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn csv(context: &'static str, source: csv::Error) -> Self {
        Self::Csv { context, source }
    }

    pub(crate) fn parse(table: &'static str, line: usize, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            table,
            line,
            message: message.to_string(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_table_and_line() {
        let err = CalibrationError::parse("pedestal table", 7, "invalid float literal");
        assert_eq!(err.to_string(), "pedestal table, line 7: invalid float literal");
    }

    #[test]
    fn no_measurements_names_solver() {
        let err = CalibrationError::NoMeasurements {
            solver: "least-squares",
        };
        assert_eq!(
            err.to_string(),
            "least-squares solve requested without any accepted measurement"
        );
    }

    #[test]
    fn io_error_keeps_source() {
        let err = CalibrationError::io(
            "read pedestal table",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().starts_with("cannot read pedestal table"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
