use crate::stack::Stack;
use eyre::WrapErr;

impl Stack {
    /// Request deletion of the stack
    ///
    /// Returns false when there is nothing to delete.
    pub(crate) async fn destroy(&self) -> eyre::Result<bool> {
        if self.describe().await?.is_none() {
            log::info!("Stack {} does not exist", self.name);
            return Ok(false);
        }

        self.client
            .delete_stack()
            .stack_name(&self.name)
            .send()
            .await
            .inspect_err(|e| log::error!("Failed to delete stack {}: {e:?}", self.name))
            .wrap_err(format!("Failed to delete stack {}", self.name))?;

        Ok(true)
    }
}
