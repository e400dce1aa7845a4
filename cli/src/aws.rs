use crate::error::Error;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use branchstack_common::InfraConfig;
use eyre::{ContextCompat, WrapErr};

/// SDK config for the region the stacks are deployed to
pub(crate) async fn sdk_config(config: &InfraConfig) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.environment.region.clone()))
        .load()
        .await
}

/// Refuse to touch stacks when the credentials belong to another account
pub(crate) async fn ensure_account(sdk: &SdkConfig, expected: &str) -> eyre::Result<()> {
    let identity = aws_sdk_sts::Client::new(sdk)
        .get_caller_identity()
        .send()
        .await
        .inspect_err(|e| log::error!("Failed to get caller identity: {e:?}"))
        .wrap_err(Error::new(
            "Failed to resolve AWS credentials",
            Some("Check your AWS profile or environment variables."),
        ))?;

    let account = identity
        .account()
        .wrap_err("Caller identity has no account")?;

    if account != expected {
        return Err(Error::new(
            "Wrong AWS account",
            Some(&format!(
                "Credentials belong to {account}, the config targets {expected}."
            )),
        )
        .into());
    }

    log::info!("Deploying to account {account}");
    Ok(())
}
