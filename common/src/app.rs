use crate::config::InfraConfig;
use crate::context::{BranchContext, Composition};
use crate::lookup::LookupStore;
use crate::stack::{BranchStack, SharedStack};
use crate::template::Template;

/// Entry point of synthesis
///
/// Always builds the shared stack, adds a branch stack on top of it when the composition asks
/// for one.
#[derive(Debug, Clone)]
pub struct App {
    config: InfraConfig,
    shared: SharedStack,
}

impl App {
    /// Validates the config before anything is declared
    pub fn new(config: InfraConfig) -> eyre::Result<Self> {
        config.validate()?;
        let shared = SharedStack::new(&config);
        Ok(App { config, shared })
    }

    pub fn config(&self) -> &InfraConfig {
        &self.config
    }

    pub fn shared(&self) -> &SharedStack {
        &self.shared
    }

    pub async fn branch(
        &self,
        context: &BranchContext,
        store: &dyn LookupStore,
    ) -> eyre::Result<BranchStack> {
        BranchStack::new(&self.config, context, self.shared.refs(), store).await
    }

    /// Templates of all stacks of the composition, shared one first
    pub async fn synth(
        &self,
        composition: &Composition,
        store: &dyn LookupStore,
    ) -> eyre::Result<Vec<Template>> {
        let mut templates = vec![self.shared.template().clone()];

        if let Composition::SharedPlusBranch(context) = composition {
            templates.push(self.branch(context, store).await?.into_template());
        }

        Ok(templates)
    }
}
