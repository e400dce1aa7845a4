mod runner;
use crate::commands::ContextArgs;
use crate::runner::{Runnable, Runner, Settings};
use crate::writer::Writer;
use clap::ArgAction;
use runner::SynthRunner;
use std::path::PathBuf;

#[derive(clap::Args, Clone)]
pub(crate) struct SynthCommand {
    #[command(flatten)]
    context: ContextArgs,

    /// Directory to write templates to
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Print templates instead of writing files
    #[arg(long, action = ArgAction::SetTrue)]
    stdout: bool,

    /// Always read lookup values from SSM instead of the context file
    #[arg(long, action = ArgAction::SetTrue)]
    no_cache: bool,
}

impl Runnable for SynthCommand {
    fn runner<'a>(&self, writer: &'a Writer, settings: &'a Settings) -> impl Runner + 'a {
        SynthRunner {
            command: self.clone(),
            writer,
            settings,
        }
    }
}
