pub(crate) mod deploy;
pub(crate) mod destroy;
pub(crate) mod status;

use aws_config::SdkConfig;
use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use aws_sdk_cloudformation::types::Stack as CfnStack;
use eyre::WrapErr;

/// A CloudFormation stack addressed by name
pub(crate) struct Stack {
    client: aws_sdk_cloudformation::Client,
    pub(crate) name: String,
}

impl Stack {
    pub(crate) fn new(sdk: &SdkConfig, name: &str) -> Self {
        Stack {
            client: aws_sdk_cloudformation::Client::new(sdk),
            name: name.to_string(),
        }
    }

    /// Current state of the stack, None if it does not exist
    pub(crate) async fn describe(&self) -> eyre::Result<Option<CfnStack>> {
        match self
            .client
            .describe_stacks()
            .stack_name(&self.name)
            .send()
            .await
        {
            Ok(output) => Ok(output.stacks().first().cloned()),

            Err(e)
                if e.as_service_error()
                    .and_then(|e| e.message())
                    .is_some_and(|m| m.contains("does not exist")) =>
            {
                Ok(None)
            }

            Err(e) => Err(e).wrap_err(format!("Failed to describe stack {}", self.name)),
        }
    }
}
