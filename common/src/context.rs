use crate::lookup::{check_parameter_name, LookupKey};
use eyre::{bail, ensure, WrapErr};
use regex::Regex;

/// Branch and version of a single invocation
///
/// Both come from the environment (BRANCH, VERSION) or from command line flags.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub branch: Option<String>,
    pub version: Option<String>,
}

/// A branch to deploy and the image tag to deploy it with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchContext {
    branch: String,
    version: String,
}

/// What a single invocation builds
///
/// Resolved once at startup, the shared stack is part of both variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Composition {
    SharedOnly,
    SharedPlusBranch(BranchContext),
}

impl BranchContext {
    /// Validate both values
    ///
    /// The branch ends up in lookup keys, so it is limited to the characters SSM parameter
    /// names accept. The version is used as an image tag.
    pub fn new(branch: &str, version: &str) -> eyre::Result<Self> {
        let branch = branch.trim();
        let version = version.trim();
        ensure!(!branch.is_empty(), "Branch name is empty");
        ensure!(!version.is_empty(), "Version is empty");

        ensure!(
            Regex::new(r"^[A-Za-z0-9_.\-/]{1,200}$")?.is_match(branch),
            "Branch name contains unsupported characters: {branch}"
        );

        ensure!(
            Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]{0,127}$")?.is_match(version),
            "Version is not a valid image tag: {version}"
        );

        // The branch leads every lookup key it publishes
        check_parameter_name(&LookupKey::DbHost(branch.to_string()).parameter_name(""))
            .wrap_err(format!("Branch name {branch} cannot be used in lookup keys"))?;

        Ok(BranchContext {
            branch: branch.to_string(),
            version: version.to_string(),
        })
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl InvocationContext {
    pub fn new(branch: Option<String>, version: Option<String>) -> Self {
        // Blank values are treated the same as unset ones
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        InvocationContext {
            branch: non_empty(branch),
            version: non_empty(version),
        }
    }

    /// Decide which stacks to build
    pub fn resolve(&self) -> eyre::Result<Composition> {
        match (&self.branch, &self.version) {
            (None, None) => Ok(Composition::SharedOnly),

            (None, Some(version)) => {
                log::warn!("Version {version} given without a branch, building shared stack only");
                Ok(Composition::SharedOnly)
            }

            (Some(branch), None) => bail!("Branch {branch} given without a version"),

            (Some(branch), Some(version)) => Ok(Composition::SharedPlusBranch(
                BranchContext::new(branch, version)?,
            )),
        }
    }
}

impl Composition {
    pub fn branch(&self) -> Option<&BranchContext> {
        match self {
            Composition::SharedOnly => None,
            Composition::SharedPlusBranch(context) => Some(context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_branch_means_shared_only() {
        let composition = InvocationContext::new(None, None).resolve().unwrap();
        assert_eq!(composition, Composition::SharedOnly);

        let composition = InvocationContext::new(Some("  ".into()), Some("1.2.0".into()))
            .resolve()
            .unwrap();
        assert_eq!(composition, Composition::SharedOnly);
    }

    #[test]
    fn branch_requires_version() {
        assert!(InvocationContext::new(Some("main".into()), None)
            .resolve()
            .is_err());
    }

    #[test]
    fn branch_and_version() {
        let composition = InvocationContext::new(Some("feature/login".into()), Some("v42".into()))
            .resolve()
            .unwrap();

        let context = composition.branch().unwrap();
        assert_eq!(context.branch(), "feature/login");
        assert_eq!(context.version(), "v42");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(BranchContext::new("has space", "v1").is_err());
        assert!(BranchContext::new("main", "-v1").is_err());
        assert!(BranchContext::new("main", "v1:latest").is_err());
    }

    #[test]
    fn rejects_branches_unusable_as_parameter_names() {
        assert!(BranchContext::new("aws-sdk-upgrade", "v1").is_err());
        assert!(BranchContext::new("SSM/fix", "v1").is_err());
        assert!(BranchContext::new(&"a/".repeat(15), "v1").is_err());

        assert!(BranchContext::new(&format!("{}b", "a/".repeat(14)), "v1").is_ok());
        assert!(BranchContext::new("feature/awscli", "v1").is_ok());
    }
}
