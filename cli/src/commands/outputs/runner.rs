use crate::commands::outputs::{collect, report, OutputsCommand};
use crate::error::Error;
use crate::runner::{Runner, Settings};
use crate::writer::Writer;

pub(crate) struct OutputsRunner<'a> {
    pub(crate) command: OutputsCommand,
    pub(crate) writer: &'a Writer,
    pub(crate) settings: &'a Settings,
}

impl Runner for OutputsRunner<'_> {
    fn writer(&self) -> &Writer {
        self.writer
    }

    fn settings(&self) -> &Settings {
        self.settings
    }

    /// Print what post-deploy tooling reads from the lookup store
    async fn run(&mut self) -> Result<(), Error> {
        let app = self.app()?;
        let branch = self.command.branch.trim();

        if branch.is_empty() {
            return Err(self.error(Some("Branch name is empty"), None, None));
        }

        // Outputs change on every deploy, never serve them from the context file
        let store = self.lookup_store(app.config(), false).await;

        let outputs = collect(store.as_ref(), branch)
            .await
            .map_err(|e| self.aws_error(Some(format!("{e:?}").into())))?;

        report(self.writer, branch, &outputs)
    }
}
