/// Display global error message in unified format
#[derive(Debug)]
pub struct Error(String, Option<String>);

impl Error {
    pub fn new(message: &str, details: Option<&str>) -> Self {
        Error(message.to_string(), details.map(|d| d.to_string()))
    }

    pub fn message(&self) -> &str {
        &self.0
    }

    pub fn details(&self) -> Option<&str> {
        self.1.as_deref()
    }
}

/// Display the message and details, as sort of a hint
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.1 {
            Some(details) => write!(f, "{}\n\n{}", self.0, console::style(details).dim()),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Implement std::error::Error trait for Error
impl std::error::Error for Error {}

/// Automatically convert all eyre error reports
///
/// An Error used as context survives the conversion, any other report keeps its cause chain
/// as details.
impl From<eyre::ErrReport> for Error {
    fn from(error: eyre::ErrReport) -> Self {
        log::error!("{error:?}");

        error.downcast::<Error>().unwrap_or_else(|err| {
            let causes = err
                .chain()
                .skip(1)
                .map(|cause| cause.to_string())
                .collect::<Vec<_>>();

            if causes.is_empty() {
                Error::new(&err.to_string(), None)
            } else {
                Error::new(&err.to_string(), Some(&causes.join(": ")))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn keeps_error_used_as_context() {
        let report = Err::<(), _>(eyre::eyre!("connection reset"))
            .wrap_err(Error::new("Deployment failed", Some("Try again later.")))
            .unwrap_err();

        let error = Error::from(report);
        assert_eq!(error.message(), "Deployment failed");
        assert_eq!(error.details(), Some("Try again later."));
    }

    #[test]
    fn chain_becomes_details() {
        let report = Err::<(), _>(eyre::eyre!("parameter not found"))
            .wrap_err("Failed to resolve the shared network")
            .unwrap_err();

        let error = Error::from(report);
        assert_eq!(error.message(), "Failed to resolve the shared network");
        assert_eq!(error.details(), Some("parameter not found"));
    }
}
