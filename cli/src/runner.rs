use crate::aws;
use crate::config::{build_config, load};
use crate::error::Error;
use crate::lookup::{CachedLookupStore, SsmLookupStore};
use crate::progress::{Progress, ProgressStatus};
use crate::stack::deploy::DeployOutcome;
use crate::stack::status::Phase;
use crate::stack::Stack;
use crate::writer::Writer;
use aws_config::SdkConfig;
use branchstack_common::{App, InfraConfig, LookupStore, Template};
use std::error::Error as StdError;
use std::path::PathBuf;

/// Options shared by all commands
pub(crate) struct Settings {
    pub(crate) config_path: PathBuf,
}

pub(crate) trait Runner {
    fn writer(&self) -> &Writer;

    fn settings(&self) -> &Settings;

    /// Load and validate the config, and declare the shared stack
    fn app(&self) -> Result<App, Error> {
        let config = load(&self.settings().config_path)?;

        App::new(config).map_err(|e| {
            self.error(
                Some("Invalid configuration"),
                Some(&format!("{e}")),
                None,
            )
        })
    }

    /// Lookup store in SSM, optionally cached in the context file
    async fn lookup_store(&self, config: &InfraConfig, cached: bool) -> Box<dyn LookupStore> {
        let ssm = SsmLookupStore::new(&aws::sdk_config(config).await, &config.app.lookup_namespace);

        if cached {
            let build = build_config();

            Box::new(CachedLookupStore::new(
                ssm,
                PathBuf::from(build.context_file),
                &config.environment,
                &config.app.lookup_namespace,
                build.cache_expires_in,
            ))
        } else {
            Box::new(ssm)
        }
    }

    /// Deploy a template and wait until the provider is done with it
    async fn deploy_stack(&self, sdk: &SdkConfig, template: &Template) -> Result<(), Error> {
        let stack = Stack::new(sdk, template.stack_name());
        let progress = Progress::new(&stack.name, self.writer().is_structured());
        progress.log_stage("Deploying");

        let outcome = stack.deploy(template).await.inspect_err(|_| {
            progress.finish("Failed", ProgressStatus::Error, None);
        })?;

        if outcome == DeployOutcome::Unchanged {
            progress.finish("Unchanged", ProgressStatus::Warn, None);
            return Ok(());
        }

        let status = stack.wait(&progress).await?;

        match status.as_deref().map(Phase::of) {
            Some(Phase::Succeeded) => {
                progress.finish("Deployed", ProgressStatus::Success, None);
                Ok(())
            }

            _ => {
                let status = status.unwrap_or_else(|| "DELETED".into());
                progress.finish("Failed", ProgressStatus::Error, Some(&status));

                let reasons = stack.failure_reasons().await.unwrap_or_else(|e| {
                    log::error!("Failed to fetch failure reasons: {e:?}");
                    vec![]
                });

                Err(self.error(
                    Some(&format!("Stack {} ended in {status}", stack.name)),
                    Some(&reasons.join("\n")),
                    None,
                ))
            }
        }
    }

    /// Run the command
    ///
    /// Returns an error shown to the user in case of failure
    async fn run(&mut self) -> Result<(), Error>;

    /// Construct an error shown to the user
    fn error(
        &self,
        title: Option<&str>,
        description: Option<&str>,
        origin: Option<Box<dyn StdError>>,
    ) -> Error {
        if let Some(origin) = origin {
            log::error!("{origin:?}");
        }

        if let Some(title) = title {
            Error::new(title, description.filter(|d| !d.is_empty()))
        } else {
            Error::new(
                "Failed to run the command",
                Some("Run again with RUST_LOG=debug for details."),
            )
        }
    }

    /// A shortcut to display provider error message
    fn aws_error(&self, origin: Option<Box<dyn StdError>>) -> Error {
        self.error(
            Some("AWS request failed"),
            Some("Check your credentials and try again."),
            origin,
        )
    }
}

/// Return a runner for a command
pub(crate) trait Runnable {
    fn runner<'a>(&self, writer: &'a Writer, settings: &'a Settings) -> impl Runner + 'a;
}
