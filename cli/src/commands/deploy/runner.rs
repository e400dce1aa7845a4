use crate::aws;
use crate::commands::deploy::DeployCommand;
use crate::commands::outputs::{collect, report};
use crate::error::Error;
use crate::lookup::SsmLookupStore;
use crate::runner::{Runner, Settings};
use crate::writer::Writer;
use branchstack_common::Composition;

pub(crate) struct DeployRunner<'a> {
    pub(crate) command: DeployCommand,
    pub(crate) writer: &'a Writer,
    pub(crate) settings: &'a Settings,
}

impl Runner for DeployRunner<'_> {
    fn writer(&self) -> &Writer {
        self.writer
    }

    fn settings(&self) -> &Settings {
        self.settings
    }

    /// Deploy the shared stack first, then the branch stack on top of it
    ///
    /// The branch stack is declared only after the shared one is deployed, so the VPC id it
    /// looks up is already published.
    async fn run(&mut self) -> Result<(), Error> {
        let composition = self.command.context.composition()?;
        let app = self.app()?;
        let config = app.config();

        if self.command.skip_shared && composition == Composition::SharedOnly {
            return Err(self.error(
                Some("Nothing to deploy"),
                Some("Pass a branch and a version, or drop --skip-shared."),
                None,
            ));
        }

        let sdk = aws::sdk_config(config).await;
        aws::ensure_account(&sdk, &config.environment.account).await?;

        if self.command.skip_shared {
            log::info!("Skipping the shared stack");
        } else {
            self.deploy_stack(&sdk, app.shared().template()).await?;
        }

        let Some(context) = composition.branch() else {
            return Ok(());
        };

        // Read fresh values, a cached VPC id may belong to a replaced network
        let store = SsmLookupStore::new(&sdk, &config.app.lookup_namespace);

        let branch = app.branch(context, &store).await.map_err(|e| {
            self.error(
                Some("Failed to declare the branch stack"),
                Some(&format!("{e:#}")),
                None,
            )
        })?;

        self.deploy_stack(&sdk, branch.template()).await?;

        let outputs = collect(&store, context.branch())
            .await
            .map_err(|e| self.aws_error(Some(format!("{e:?}").into())))?;

        report(self.writer, context.branch(), &outputs)
    }
}
