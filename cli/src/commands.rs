pub(crate) mod deploy;
pub(crate) mod destroy;
pub(crate) mod outputs;
pub(crate) mod synth;
use branchstack_common::{Composition, InvocationContext};
use clap::Subcommand;

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Write CloudFormation templates of the stacks, without deployment
    Synth(synth::SynthCommand),

    /// Deploy the shared stack and, when a branch is given, the stack of the branch
    Deploy(deploy::DeployCommand),

    /// Print the values a branch stack published
    Outputs(outputs::OutputsCommand),

    /// [DANGER] Destroy the stack of a branch
    Destroy(destroy::DestroyCommand),
}

/// Branch and version of the invocation
#[derive(clap::Args, Clone, Debug)]
pub(crate) struct ContextArgs {
    /// Branch to build a service stack for, only the shared stack is built without it
    #[arg(short, long, env = "BRANCH")]
    branch: Option<String>,

    /// Version of the service, used as the container image tag
    #[arg(long = "app-version", env = "VERSION")]
    version: Option<String>,
}

impl ContextArgs {
    pub(crate) fn composition(&self) -> eyre::Result<Composition> {
        InvocationContext::new(self.branch.clone(), self.version.clone()).resolve()
    }
}
