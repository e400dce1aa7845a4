use crate::logger::Logger;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{stdout, IsTerminal};
use std::time::Duration;

pub(crate) enum ProgressStatus {
    Success,
    Warn,
    Error,
}

/// Spinner of a single stack
///
/// Hidden when the output is structured or not a terminal, stages are still printed in the
/// latter case.
pub(crate) struct Progress {
    progress_bar: ProgressBar,
    stack_name: String,
    is_visible: bool,
}

impl Progress {
    pub(crate) fn new(stack_name: &str, is_structured: bool) -> Self {
        let is_visible = !is_structured;

        let progress_bar = if is_visible && stdout().is_terminal() {
            let bar = Logger::multi_progress().add(ProgressBar::new_spinner());

            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );

            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            progress_bar,
            stack_name: stack_name.to_string(),
            is_visible,
        }
    }

    pub(crate) fn log_stage(&self, stage: &str) {
        if !self.is_visible {
            return;
        }

        let msg = format!(
            "{} {}",
            console::style(self.with_padding(stage)).green().bold(),
            self.stack_name,
        );

        // Terminal or CI/CD?
        if stdout().is_terminal() {
            self.progress_bar.println(msg);
        } else {
            self.progress_bar.suspend(|| {
                println!("{msg}");
            });
        }
    }

    /// Show the latest provider status next to the spinner
    pub(crate) fn set_status(&self, status: &str) {
        self.progress_bar.set_message(format!(
            "{} {}",
            self.stack_name,
            console::style(status).dim()
        ));
    }

    pub(crate) fn finish(&self, stage: &str, status: ProgressStatus, message: Option<&str>) {
        self.progress_bar.finish_and_clear();

        if !self.is_visible {
            return;
        }

        let stage = console::style(self.with_padding(stage)).bold();
        let stage = match status {
            ProgressStatus::Success => stage.green(),
            ProgressStatus::Warn => stage.yellow(),
            ProgressStatus::Error => stage.red(),
        };

        let message = message.map(|m| format!(": {m}")).unwrap_or_default();
        println!("{} {}{}", stage, self.stack_name, message);
    }

    // Required padding to make the message centered in the cargo-like style
    fn with_padding(&self, message: &str) -> String {
        format!("{:>12}", message)
    }
}
