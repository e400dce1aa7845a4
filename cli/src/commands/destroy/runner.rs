use crate::aws;
use crate::commands::destroy::DestroyCommand;
use crate::error::Error;
use crate::progress::{Progress, ProgressStatus};
use crate::runner::{Runner, Settings};
use crate::stack::status::Phase;
use crate::stack::Stack;
use crate::writer::Writer;
use branchstack_common::stack::BranchNames;
use eyre::WrapErr;
use serde_json::json;
use std::io::{self, Write};

pub(crate) struct DestroyRunner<'a> {
    pub(crate) command: DestroyCommand,
    pub(crate) writer: &'a Writer,
    pub(crate) settings: &'a Settings,
}

impl Runner for DestroyRunner<'_> {
    fn writer(&self) -> &Writer {
        self.writer
    }

    fn settings(&self) -> &Settings {
        self.settings
    }

    /// Delete the stack of a branch, the shared stack is never touched
    async fn run(&mut self) -> Result<(), Error> {
        let app = self.app()?;
        let config = app.config();
        let branch = self.command.branch.trim();

        if branch.is_empty() {
            return Err(self.error(Some("Branch name is empty"), None, None));
        }

        let names = BranchNames::new(&config.app.name, branch);

        if !self.command.yes {
            if self.writer.is_structured() {
                return Err(self.error(
                    Some("Confirmation required"),
                    Some("Pass --yes to destroy without a prompt."),
                    None,
                ));
            }

            if !self.confirm(&names.stack)? {
                self.writer
                    .text(&console::style("Destroying canceled").dim().bold().to_string())?;
                return Ok(());
            }
        }

        let sdk = aws::sdk_config(config).await;
        aws::ensure_account(&sdk, &config.environment.account).await?;

        let stack = Stack::new(&sdk, &names.stack);
        let progress = Progress::new(&stack.name, self.writer.is_structured());

        let destroyed = stack.destroy().await.inspect_err(|_| {
            progress.finish("Failed", ProgressStatus::Error, None);
        })?;

        if !destroyed {
            progress.finish("Missing", ProgressStatus::Warn, Some("nothing to destroy"));
            return self.writer.json(json!({"stack": names.stack, "destroyed": false}));
        }

        progress.log_stage("Destroying");

        let status = stack.wait(&progress).await.inspect_err(|_| {
            progress.finish("Failed", ProgressStatus::Error, None);
        })?;

        match status {
            None => {
                progress.finish("Destroyed", ProgressStatus::Success, None);
                self.writer.json(json!({"stack": names.stack, "destroyed": true}))
            }

            Some(status) if Phase::of(&status) == Phase::Succeeded => {
                progress.finish("Destroyed", ProgressStatus::Success, None);
                self.writer.json(json!({"stack": names.stack, "destroyed": true}))
            }

            Some(status) => {
                progress.finish("Failed", ProgressStatus::Error, Some(&status));
                let reasons = stack.failure_reasons().await.unwrap_or_default();

                Err(self.error(
                    Some(&format!("Stack {} ended in {status}", names.stack)),
                    Some(&reasons.join("\n")),
                    None,
                ))
            }
        }
    }
}

impl DestroyRunner<'_> {
    fn confirm(&self, stack_name: &str) -> eyre::Result<bool> {
        print!(
            "{} {} {}: ",
            console::style("Destroy stack").bold(),
            console::style(stack_name).yellow(),
            console::style("[y/N]").dim()
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin()
            .read_line(&mut input)
            .wrap_err("Failed to read input")?;

        Ok(matches!(input.trim().to_lowercase().as_ref(), "y" | "yes"))
    }
}
