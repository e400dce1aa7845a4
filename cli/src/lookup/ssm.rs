use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ssm::types::ParameterType;
use branchstack_common::{LookupKey, LookupStore};
use eyre::{bail, WrapErr};

/// Lookup store backed by SSM Parameter Store
pub(crate) struct SsmLookupStore {
    client: aws_sdk_ssm::Client,
    namespace: String,
}

impl SsmLookupStore {
    pub(crate) fn new(sdk: &SdkConfig, namespace: &str) -> Self {
        SsmLookupStore {
            client: aws_sdk_ssm::Client::new(sdk),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl LookupStore for SsmLookupStore {
    async fn get(&self, key: &LookupKey) -> eyre::Result<Option<String>> {
        let name = key.parameter_name(&self.namespace);

        match self.client.get_parameter().name(&name).send().await {
            Ok(output) => Ok(output
                .parameter()
                .and_then(|parameter| parameter.value())
                .map(String::from)),

            Err(e)
                if e.as_service_error()
                    .is_some_and(|e| e.is_parameter_not_found()) =>
            {
                log::debug!("Parameter {name} is not published");
                Ok(None)
            }

            Err(e) => Err(e).wrap_err(format!("Failed to read parameter {name}")),
        }
    }

    async fn put(&self, key: &LookupKey, value: &str) -> eyre::Result<()> {
        let name = key.parameter_name(&self.namespace);

        match self.get(key).await? {
            Some(existing) if existing == value => return Ok(()),
            Some(existing) => bail!("Parameter {name} is already published as {existing}"),
            None => {}
        }

        self.client
            .put_parameter()
            .name(&name)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(false)
            .send()
            .await
            .wrap_err(format!("Failed to publish parameter {name}"))?;

        log::info!("Published {name}");
        Ok(())
    }
}
