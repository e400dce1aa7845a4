mod runner;
use crate::commands::ContextArgs;
use crate::runner::{Runnable, Runner, Settings};
use crate::writer::Writer;
use clap::ArgAction;
use runner::DeployRunner;

#[derive(clap::Args, Clone)]
pub(crate) struct DeployCommand {
    #[command(flatten)]
    context: ContextArgs,

    /// Deploy only the stack of the branch, the shared stack must be deployed already
    #[arg(long, action = ArgAction::SetTrue)]
    skip_shared: bool,
}

impl Runnable for DeployCommand {
    fn runner<'a>(&self, writer: &'a Writer, settings: &'a Settings) -> impl Runner + 'a {
        DeployRunner {
            command: self.clone(),
            writer,
            settings,
        }
    }
}
