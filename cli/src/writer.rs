use crate::error::Error;
use serde_json::json;
use std::io::Write;

/// Write all stdout/stderr outputs in the app
///
/// Either human readable text or one JSON document per line, for CI pipelines and other
/// post-deploy tooling.
#[derive(Default)]
pub(crate) struct Writer {
    is_structured: bool,
}

impl Writer {
    pub(crate) fn new(is_structured: bool) -> Self {
        Writer { is_structured }
    }

    pub(crate) fn is_structured(&self) -> bool {
        self.is_structured
    }

    /// Output plain text
    ///
    /// Skipped with a warning in the log in structured mode.
    pub(crate) fn text(&self, output: &str) -> Result<(), Error> {
        if self.is_structured {
            log::warn!("Skipping output (not structured data): {output}");
            return Ok(());
        }

        self.write(&format!("{output}\n"), false)
    }

    /// Output serialized JSON
    ///
    /// Skipped with a warning in the log in plain text mode.
    pub(crate) fn json(&self, output: serde_json::Value) -> Result<(), Error> {
        if !self.is_structured {
            log::warn!("Skipping output (not plain text): {output}");
            return Ok(());
        }

        self.write(&format!("{output}\n"), false)
    }

    /// Report a failed command, in stderr for humans and as JSON otherwise
    pub(crate) fn failure(&self, error: &Error) {
        let result = if self.is_structured {
            self.write(
                &format!(
                    "{}\n",
                    json!({"error": error.message(), "details": error.details()})
                ),
                false,
            )
        } else {
            self.write(
                &format!("\n{}\n{error}\n", console::style("Error").red().bold()),
                true,
            )
        };

        if let Err(e) = result {
            log::error!("Failed to report an error: {e:?}");
        }
    }

    /// General method for writing to stdout/stderr
    fn write(&self, output: &str, is_error: bool) -> Result<(), Error> {
        let result = if is_error {
            std::io::stderr().write_all(output.as_bytes())
        } else {
            std::io::stdout().write_all(output.as_bytes())
        };

        result.map_err(|e| {
            log::error!("Error while writing to std*: {e:?}");
            Error::new("Output error", None)
        })
    }
}
