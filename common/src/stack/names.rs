use regex::Regex;
use twox_hash::XxHash64;

/// Longest part of the branch name kept in physical names
///
/// Load balancer and target group names are limited to 32 characters.
const SLUG_LEN: usize = 16;

/// Lowercase branch name with runs of other characters collapsed to a hyphen
fn slug(branch: &str) -> String {
    let lowercase = branch.to_lowercase();

    let collapsed = match Regex::new(r"[^a-z0-9]+") {
        Ok(re) => re.replace_all(&lowercase, "-").into_owned(),
        Err(_) => lowercase,
    };

    let truncated: String = collapsed.trim_matches('-').chars().take(SLUG_LEN).collect();
    let truncated = truncated.trim_end_matches('-');

    if truncated.is_empty() {
        "branch".into()
    } else {
        truncated.into()
    }
}

/// First eight hex digits of the hash of the raw branch name
///
/// Keeps names of branches that share a slug apart, e.g. "feature/a" and "feature-a".
fn digest(branch: &str) -> String {
    format!("{:016x}", XxHash64::oneshot(0, branch.as_bytes()))[..8].to_string()
}

/// Physical names of all resources of a branch stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNames {
    pub stack: String,
    pub load_balancer: String,
    pub target_group: String,
    pub task_family: String,
    pub service: String,
    pub database: String,
    pub log_group: String,

    /// Prefix of log streams of the branch's containers
    pub log_stream_prefix: String,
}

impl BranchNames {
    pub fn new(app: &str, branch: &str) -> Self {
        let mut base = format!("{}-{}", slug(branch), digest(branch));

        // Load balancer names must not start with "internal-"
        if base.starts_with("internal-") {
            base = format!("b-{base}");
        }

        BranchNames {
            stack: format!("{app}-{base}"),
            load_balancer: format!("{base}-alb"),
            target_group: format!("{base}-tg"),
            task_family: format!("{app}-{base}-task"),
            service: format!("{app}-{base}-service"),
            database: format!("{app}-{base}-db"),
            log_group: format!("/{app}/{base}"),
            log_stream_prefix: base,
        }
    }

    /// Every name, for uniqueness checks
    pub fn all(&self) -> [&str; 7] {
        [
            &self.stack,
            &self.load_balancer,
            &self.target_group,
            &self.task_family,
            &self.service,
            &self.database,
            &self.log_group,
        ]
    }
}
