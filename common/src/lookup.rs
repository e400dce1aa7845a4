use async_trait::async_trait;
use eyre::{bail, ContextCompat};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Keys of values published for discovery across stacks
///
/// The shared stack publishes the VPC id, a branch stack publishes what post-deploy tooling
/// needs to reach the branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    VpcId,
    DbHost(String),
    ServiceArn(String),
    AlbDnsName(String),
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LookupKey::VpcId => write!(f, "vpcid"),
            LookupKey::DbHost(branch) => write!(f, "{branch}-db-host"),
            LookupKey::ServiceArn(branch) => write!(f, "{branch}-service-arn"),
            LookupKey::AlbDnsName(branch) => write!(f, "{branch}-alb-dns-name"),
        }
    }
}

impl LookupKey {
    /// All keys published for a branch
    pub fn branch_keys(branch: &str) -> [LookupKey; 3] {
        [
            LookupKey::DbHost(branch.to_string()),
            LookupKey::ServiceArn(branch.to_string()),
            LookupKey::AlbDnsName(branch.to_string()),
        ]
    }

    /// Full SSM parameter name under the namespace
    ///
    /// SSM requires names that contain a slash to be fully qualified.
    pub fn parameter_name(&self, namespace: &str) -> String {
        let namespace = namespace.trim_end_matches('/');
        let key = self.to_string();

        if namespace.is_empty() {
            if key.contains('/') {
                format!("/{key}")
            } else {
                key
            }
        } else if namespace.starts_with('/') {
            format!("{namespace}/{key}")
        } else {
            format!("/{namespace}/{key}")
        }
    }

    /// Logical id of the parameter resource that publishes the key
    pub fn logical_id(&self) -> &'static str {
        match self {
            LookupKey::VpcId => "VpcIdParameter",
            LookupKey::DbHost(_) => "DbHostParameter",
            LookupKey::ServiceArn(_) => "ServiceArnParameter",
            LookupKey::AlbDnsName(_) => "AlbDnsNameParameter",
        }
    }
}

/// Deepest hierarchy SSM accepts in a parameter name
const MAX_PARAMETER_LEVELS: usize = 15;

/// Check a full parameter name against the naming rules of SSM
///
/// Names must not start with the reserved "aws" or "ssm" prefixes, in any case, and must not
/// be nested deeper than fifteen levels.
pub fn check_parameter_name(name: &str) -> eyre::Result<()> {
    let first = name.trim_start_matches('/').to_lowercase();

    if first.starts_with("aws") || first.starts_with("ssm") {
        bail!("Parameter name {name} starts with a reserved prefix (aws, ssm)");
    }

    let levels = name.trim_start_matches('/').split('/').count();

    if levels > MAX_PARAMETER_LEVELS {
        bail!("Parameter name {name} is nested {levels} levels deep, at most {MAX_PARAMETER_LEVELS} are allowed");
    }

    Ok(())
}

/// Namespaced key-value store shared by independently synthesized stacks
///
/// Write once, read many: a key is written by the stack that owns the value and is only read
/// afterwards. Readers must not run before the writer, the store does not wait for values.
#[async_trait]
pub trait LookupStore: Send + Sync {
    /// Value of the key, None if it was never published
    async fn get(&self, key: &LookupKey) -> eyre::Result<Option<String>>;

    /// Publish a value
    ///
    /// Writing the same value again is a no-op, writing a different one is an error.
    async fn put(&self, key: &LookupKey, value: &str) -> eyre::Result<()>;

    /// Value of a key that must have been published already
    async fn require(&self, key: &LookupKey) -> eyre::Result<String> {
        self.get(key).await?.wrap_err(format!(
            "Lookup key \"{key}\" is not published yet, deploy the stack that owns it first"
        ))
    }
}

/// In-process store
///
/// Fails closed: reading a key that was not written is reported by `require` as an error.
#[derive(Debug, Default)]
pub struct MemoryLookupStore {
    entries: Mutex<HashMap<LookupKey, String>>,
}

impl MemoryLookupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> eyre::Result<std::sync::MutexGuard<'_, HashMap<LookupKey, String>>> {
        self.entries
            .lock()
            .map_err(|_| eyre::eyre!("Lookup store lock is poisoned"))
    }
}

#[async_trait]
impl LookupStore for MemoryLookupStore {
    async fn get(&self, key: &LookupKey) -> eyre::Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn put(&self, key: &LookupKey, value: &str) -> eyre::Result<()> {
        let mut entries = self.entries()?;

        match entries.get(key) {
            Some(existing) if existing == value => Ok(()),
            Some(existing) => bail!("Lookup key \"{key}\" is already published as {existing}"),

            None => {
                entries.insert(key.clone(), value.to_string());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names() {
        assert_eq!(LookupKey::VpcId.to_string(), "vpcid");
        assert_eq!(LookupKey::DbHost("dev".into()).to_string(), "dev-db-host");
        assert_eq!(
            LookupKey::ServiceArn("dev".into()).to_string(),
            "dev-service-arn"
        );
        assert_eq!(
            LookupKey::AlbDnsName("dev".into()).to_string(),
            "dev-alb-dns-name"
        );
    }

    #[test]
    fn parameter_names() {
        assert_eq!(LookupKey::VpcId.parameter_name(""), "vpcid");
        assert_eq!(LookupKey::VpcId.parameter_name("/app/"), "/app/vpcid");
        assert_eq!(LookupKey::VpcId.parameter_name("app"), "/app/vpcid");

        assert_eq!(
            LookupKey::DbHost("feature/x".into()).parameter_name(""),
            "/feature/x-db-host"
        );
    }

    #[test]
    fn reserved_and_deep_parameter_names() {
        assert!(check_parameter_name("dev-db-host").is_ok());
        assert!(check_parameter_name("/app/feature/x-db-host").is_ok());

        assert!(check_parameter_name("aws-test-db-host").is_err());
        assert!(check_parameter_name("/SSM/x-db-host").is_err());

        let deep = format!("{}x-db-host", "a/".repeat(14));
        assert!(check_parameter_name(&deep).is_ok());
        assert!(check_parameter_name(&format!("/ns/{deep}")).is_err());
    }

    #[tokio::test]
    async fn read_before_write_fails() {
        let store = MemoryLookupStore::new();
        assert_eq!(store.get(&LookupKey::VpcId).await.unwrap(), None);

        let error = store.require(&LookupKey::VpcId).await.unwrap_err();
        assert!(error.to_string().contains("vpcid"));

        store.put(&LookupKey::VpcId, "vpc-123").await.unwrap();
        assert_eq!(store.require(&LookupKey::VpcId).await.unwrap(), "vpc-123");
    }

    #[tokio::test]
    async fn write_once() {
        let store = MemoryLookupStore::new();
        store.put(&LookupKey::VpcId, "vpc-123").await.unwrap();
        store.put(&LookupKey::VpcId, "vpc-123").await.unwrap();
        assert!(store.put(&LookupKey::VpcId, "vpc-456").await.is_err());
        assert_eq!(store.require(&LookupKey::VpcId).await.unwrap(), "vpc-123");
    }
}
