mod runner;
use crate::runner::{Runnable, Runner, Settings};
use crate::writer::Writer;
use clap::ArgAction;
use runner::DestroyRunner;

#[derive(clap::Args, Clone)]
pub(crate) struct DestroyCommand {
    /// Branch whose stack to destroy
    #[arg(short, long, env = "BRANCH")]
    branch: String,

    /// Do not ask for confirmation
    #[arg(short, long, action = ArgAction::SetTrue)]
    yes: bool,
}

impl Runnable for DestroyCommand {
    fn runner<'a>(&self, writer: &'a Writer, settings: &'a Settings) -> impl Runner + 'a {
        DestroyRunner {
            command: self.clone(),
            writer,
            settings,
        }
    }
}
