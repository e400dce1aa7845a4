use crate::error::Error;
use crate::stack::Stack;
use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use aws_sdk_cloudformation::types::{Capability, Tag};
use branchstack_common::Template;
use eyre::WrapErr;

/// What a deploy request did to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeployOutcome {
    Created,
    Updated,
    Unchanged,
}

impl Stack {
    /// Create the stack or update it in place
    ///
    /// Does not wait for the change to finish.
    pub(crate) async fn deploy(&self, template: &Template) -> eyre::Result<DeployOutcome> {
        let body = template.to_json()?;

        let tags = template
            .tags()
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect::<Vec<Tag>>();

        let current = self.describe().await?;

        let Some(current) = current else {
            log::info!("Creating stack {}", self.name);

            self.client
                .create_stack()
                .stack_name(&self.name)
                .template_body(body)
                .capabilities(Capability::CapabilityIam)
                .set_tags(Some(tags))
                .send()
                .await
                .inspect_err(|e| log::error!("Failed to create stack {}: {e:?}", self.name))
                .wrap_err(format!("Failed to create stack {}", self.name))?;

            return Ok(DeployOutcome::Created);
        };

        // A stack that failed to create can only be deleted
        if current
            .stack_status()
            .is_some_and(|s| s.as_str() == "ROLLBACK_COMPLETE")
        {
            return Err(Error::new(
                &format!("Stack {} failed to create earlier", self.name),
                Some("Delete the stack and deploy again."),
            )
            .into());
        }

        log::info!("Updating stack {}", self.name);

        match self
            .client
            .update_stack()
            .stack_name(&self.name)
            .template_body(body)
            .capabilities(Capability::CapabilityIam)
            .set_tags(Some(tags))
            .send()
            .await
        {
            Ok(_) => Ok(DeployOutcome::Updated),

            Err(e)
                if e.as_service_error()
                    .and_then(|e| e.message())
                    .is_some_and(|m| m.contains("No updates are to be performed")) =>
            {
                Ok(DeployOutcome::Unchanged)
            }

            Err(e) => {
                log::error!("Failed to update stack {}: {e:?}", self.name);
                Err(e).wrap_err(format!("Failed to update stack {}", self.name))
            }
        }
    }
}
