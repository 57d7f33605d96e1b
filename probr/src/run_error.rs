use crate::exit_codes::ExitCode;

/// A failure that ends the process, tagged with the exit code it maps to.
#[derive(Debug)]
pub struct RunError {
    code: ExitCode,
    error: anyhow::Error,
}

impl RunError {
    /// Bad flags, scenario files or targets, all detected before the first probe.
    pub fn invalid(err: impl Into<anyhow::Error>, context: &'static str) -> Self {
        Self {
            code: ExitCode::InvalidInput,
            error: err.into().context(context),
        }
    }

    pub fn runtime(err: impl Into<anyhow::Error>, context: &'static str) -> Self {
        Self {
            code: ExitCode::RuntimeError,
            error: err.into().context(context),
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        self.code
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.error)
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_chain() {
        let err = RunError::invalid(
            anyhow::anyhow!("`vus` must be a positive integer"),
            "invalid scenario config",
        );
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert_eq!(
            err.to_string(),
            "invalid scenario config: `vus` must be a positive integer"
        );
    }
}
