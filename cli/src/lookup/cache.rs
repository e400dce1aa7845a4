use async_trait::async_trait;
use branchstack_common::config::Environment;
use branchstack_common::{LookupKey, LookupStore};
use chrono::{DateTime, Duration, Utc};
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// The structure of entire context file
#[derive(Debug, Default, Serialize, Deserialize)]
struct Context {
    entries: HashMap<String, Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: String,
    fetched_at: DateTime<Utc>,
}

/// Caches values of another store in a JSON file
///
/// Repeated synthesis does not hit the network for values that rarely change, like the
/// VPC id. Entries older than the expiry are fetched again.
///
/// One file may hold entries of several deployment targets, every entry is keyed by the
/// account, region and full parameter name it was read for.
pub(crate) struct CachedLookupStore<S> {
    inner: S,
    path: PathBuf,
    scope: String,
    namespace: String,
    expires_in: Duration,
}

impl<S: LookupStore> CachedLookupStore<S> {
    pub(crate) fn new(
        inner: S,
        path: PathBuf,
        environment: &Environment,
        namespace: &str,
        expires_in: Duration,
    ) -> Self {
        CachedLookupStore {
            inner,
            path,
            scope: format!("{}/{}", environment.account, environment.region),
            namespace: namespace.to_string(),
            expires_in,
        }
    }

    fn entry_key(&self, key: &LookupKey) -> String {
        format!("{}:{}", self.scope, key.parameter_name(&self.namespace))
    }

    fn load(&self) -> eyre::Result<Context> {
        if !self.path.exists() {
            return Ok(Context::default());
        }

        let content = fs::read_to_string(&self.path)
            .inspect_err(|e| log::error!("Failed to read context file {:?}: {e:?}", self.path))
            .wrap_err("Failed to load lookup context")?;

        // A broken file is rebuilt from the inner store
        Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable context file {:?}: {e:?}", self.path);
            Context::default()
        }))
    }

    fn save(&self, context: &Context) -> eyre::Result<()> {
        let json = serde_json::to_string_pretty(context)
            .inspect_err(|e| log::error!("Failed to serialize lookup context: {e:?}"))
            .wrap_err("Failed to process lookup context")?;

        fs::write(&self.path, json)
            .inspect_err(|e| log::error!("Failed to write context file {:?}: {e:?}", self.path))
            .wrap_err("Failed to write lookup context")
    }

    fn remember(&self, key: &LookupKey, value: &str) -> eyre::Result<()> {
        let mut context = self.load()?;

        context.entries.insert(
            self.entry_key(key),
            Entry {
                value: value.to_string(),
                fetched_at: Utc::now(),
            },
        );

        self.save(&context)
    }
}

#[async_trait]
impl<S: LookupStore> LookupStore for CachedLookupStore<S> {
    async fn get(&self, key: &LookupKey) -> eyre::Result<Option<String>> {
        let cached = self.load()?.entries.remove(&self.entry_key(key));

        match cached {
            Some(entry) if Utc::now() - entry.fetched_at < self.expires_in => {
                log::debug!("Using cached value of {key}");
                return Ok(Some(entry.value));
            }

            Some(_) => log::debug!("Cached value of {key} expired"),
            None => {}
        }

        let value = self.inner.get(key).await?;

        if let Some(value) = &value {
            self.remember(key, value)?;
        }

        Ok(value)
    }

    async fn put(&self, key: &LookupKey, value: &str) -> eyre::Result<()> {
        self.inner.put(key, value).await?;
        self.remember(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchstack_common::MemoryLookupStore;
    use std::path::Path;

    fn environment(account: &str, region: &str) -> Environment {
        Environment {
            account: account.into(),
            region: region.into(),
        }
    }

    fn cache<S: LookupStore>(store: S, path: &Path, expires_in: Duration) -> CachedLookupStore<S> {
        CachedLookupStore::new(
            store,
            path.to_path_buf(),
            &environment("123456789012", "us-east-1"),
            "",
            expires_in,
        )
    }

    #[tokio::test]
    async fn serves_cached_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");

        let store = MemoryLookupStore::new();
        store.put(&LookupKey::VpcId, "vpc-1").await.unwrap();

        let cached = cache(store, &path, Duration::hours(1));
        assert_eq!(
            cached.get(&LookupKey::VpcId).await.unwrap(),
            Some("vpc-1".into())
        );

        // The inner store knows nothing, the file still does
        let cached = cache(MemoryLookupStore::new(), &path, Duration::hours(1));
        assert_eq!(
            cached.get(&LookupKey::VpcId).await.unwrap(),
            Some("vpc-1".into())
        );
    }

    #[tokio::test]
    async fn expired_values_are_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");

        let cached = cache(MemoryLookupStore::new(), &path, Duration::hours(1));
        cached.put(&LookupKey::VpcId, "vpc-1").await.unwrap();

        let cached = cache(MemoryLookupStore::new(), &path, Duration::zero());
        assert_eq!(cached.get(&LookupKey::VpcId).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_values_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");

        let cached = cache(MemoryLookupStore::new(), &path, Duration::hours(1));
        assert!(cached.require(&LookupKey::VpcId).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn broken_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        fs::write(&path, "{not json").unwrap();

        let store = MemoryLookupStore::new();
        store.put(&LookupKey::VpcId, "vpc-2").await.unwrap();

        let cached = cache(store, &path, Duration::hours(1));
        assert_eq!(
            cached.get(&LookupKey::VpcId).await.unwrap(),
            Some("vpc-2".into())
        );
    }

    #[tokio::test]
    async fn entries_do_not_leak_across_environments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");

        let staging = MemoryLookupStore::new();
        staging.put(&LookupKey::VpcId, "vpc-staging").await.unwrap();
        let staging = CachedLookupStore::new(
            staging,
            path.clone(),
            &environment("111111111111", "us-east-1"),
            "",
            Duration::hours(1),
        );
        assert_eq!(
            staging.get(&LookupKey::VpcId).await.unwrap(),
            Some("vpc-staging".into())
        );

        for (account, region, namespace) in [
            ("222222222222", "us-east-1", ""),
            ("111111111111", "eu-west-1", ""),
            ("111111111111", "us-east-1", "/other"),
        ] {
            let production = MemoryLookupStore::new();
            production.put(&LookupKey::VpcId, "vpc-prod").await.unwrap();

            let production = CachedLookupStore::new(
                production,
                path.clone(),
                &environment(account, region),
                namespace,
                Duration::hours(1),
            );

            assert_eq!(
                production.get(&LookupKey::VpcId).await.unwrap(),
                Some("vpc-prod".into()),
                "{account} {region} {namespace}"
            );
        }

        assert_eq!(
            staging.get(&LookupKey::VpcId).await.unwrap(),
            Some("vpc-staging".into())
        );
    }
}
