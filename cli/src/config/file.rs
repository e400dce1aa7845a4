use crate::error::Error;
use branchstack_common::InfraConfig;
use eyre::WrapErr;
use std::path::Path;

/// Read branchstack.toml and apply the deployment target from the environment
///
/// Values are validated later, when the stacks are declared.
pub(crate) fn load(path: &Path) -> eyre::Result<InfraConfig> {
    let toml_string = std::fs::read_to_string(path)
        .inspect_err(|e| log::error!("Failed to read {path:?}: {e:?}"))
        .wrap_err(Error::new(
            "Config file not found",
            Some(&format!(
                "Create {} or point to another file with --config.",
                path.display()
            )),
        ))?;

    let config: InfraConfig = toml::from_str(&toml_string)
        .wrap_err(format!("Failed to parse {}", path.display()))?;

    log::debug!("Loaded config from {path:?}");
    Ok(config.with_env(|name| std::env::var(name).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();

        writeln!(
            file,
            r#"
            [app]
            name = "shop"
            tag = "shop"

            [database]
            snapshot_identifier = "shop-seed"
            "#
        )
        .unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.app.name, "shop");
        assert_eq!(config.database.snapshot_identifier, "shop-seed");
        assert_eq!(config.service.port, 5000);
    }

    #[test]
    fn missing_file_has_a_hint() {
        let dir = tempfile::tempdir().unwrap();
        let error = Error::from(load(&dir.path().join("branchstack.toml")).unwrap_err());
        assert_eq!(error.message(), "Config file not found");
        assert!(error.details().unwrap().contains("--config"));
    }

    #[test]
    fn broken_toml_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[app\nname = ").unwrap();
        assert!(load(file.path()).is_err());
    }
}
