use eyre::{eyre, ContextCompat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Values that were left in a config file as "fill me in" markers
const PLACEHOLDERS: [&str; 6] = [
    "CHANGE_ME",
    "CHANGEME",
    "TODO",
    "REPLACE_ME",
    "XXXXXXXXXXXX",
    "000000000000",
];

/// Subnets carved out of the VPC block are always /24
const SUBNET_PREFIX: u8 = 24;

/// Supported number of availability zones
const MAX_AZS: std::ops::RangeInclusive<u8> = 2..=3;

/// Everything the stacks are parameterized with
///
/// Maps one to one onto branchstack.toml. Fields that have no sane default are empty strings
/// after deserialization and are rejected by [`InfraConfig::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InfraConfig {
    pub app: AppSection,
    pub environment: Environment,
    pub network: NetworkSection,
    pub database: DatabaseSection,
    pub service: ServiceSection,
}

/// [app]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// Prefix of every stack and physical resource name
    pub name: String,

    /// Value of the process-wide `App` tag
    pub tag: String,

    /// Optional prefix of lookup store keys, e.g. "/ecs-repo-branch"
    pub lookup_namespace: String,
}

impl Default for AppSection {
    fn default() -> Self {
        AppSection {
            name: "ecs-repo-branch".into(),
            tag: "ecs-repo-branch".into(),
            lookup_namespace: String::new(),
        }
    }
}

/// [environment]
///
/// The deployment target. Usually left out of the file and taken from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            account: String::new(),
            region: "us-east-1".into(),
        }
    }
}

/// [network]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub cidr: String,
    pub max_azs: u8,

    /// Source addresses allowed to reach the load balancer and the database directly
    pub allowed_cidrs: Vec<String>,

    /// Platform services reached through interface endpoints
    pub interface_endpoints: Vec<String>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        NetworkSection {
            cidr: "10.0.0.0/16".into(),
            max_azs: 2,
            allowed_cidrs: vec![],
            interface_endpoints: ["ecr.api", "ecr.dkr", "logs", "secretsmanager", "ssm"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// [database]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Every branch database is restored from this snapshot
    pub snapshot_identifier: String,
    pub name: String,
    pub user: String,
    pub instance_class: String,
    pub port: u16,

    /// Name of the generated administrative secret
    pub credential_name: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        DatabaseSection {
            snapshot_identifier: String::new(),
            name: "app".into(),
            user: "postgres".into(),
            instance_class: "db.t3.micro".into(),
            port: 5432,
            credential_name: "ecs-repo-branch-db-admin".into(),
        }
    }
}

/// [service]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// ARN of the ECR repository the container image is pulled from
    pub repository_arn: String,
    pub container_name: String,
    pub port: u16,
    pub health_check_path: String,
    pub cpu: u32,
    pub memory: u32,
    pub desired_count: u32,
    pub log_retention_days: u32,
}

impl Default for ServiceSection {
    fn default() -> Self {
        ServiceSection {
            repository_arn: String::new(),
            container_name: "web".into(),
            port: 5000,
            health_check_path: "/".into(),
            cpu: 256,
            memory: 512,
            desired_count: 1,
            log_retention_days: 7,
        }
    }
}

/// Parsed `arn:<partition>:ecr:<region>:<account>:repository/<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryArn {
    pub partition: String,
    pub region: String,
    pub account: String,
    pub name: String,
}

impl RepositoryArn {
    pub fn parse(arn: &str) -> eyre::Result<Self> {
        let re =
            Regex::new(r"^arn:(aws[a-z-]*):ecr:([a-z0-9-]+):(\d{12}):repository/([a-z0-9._/-]+)$")?;

        let captures = re
            .captures(arn)
            .wrap_err(format!("Not an ECR repository ARN: {arn}"))?;

        Ok(RepositoryArn {
            partition: captures[1].to_string(),
            region: captures[2].to_string(),
            account: captures[3].to_string(),
            name: captures[4].to_string(),
        })
    }

    /// Registry URI used in container definitions, without a tag
    pub fn uri(&self) -> String {
        let suffix = if self.partition == "aws-cn" {
            "amazonaws.com.cn"
        } else {
            "amazonaws.com"
        };

        format!(
            "{account}.dkr.ecr.{region}.{suffix}/{name}",
            account = self.account,
            region = self.region,
            name = self.name
        )
    }
}

/// Parsed IPv4 CIDR block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub address: Ipv4Addr,
    pub prefix: u8,
}

impl Cidr {
    pub fn parse(cidr: &str) -> eyre::Result<Self> {
        let (address, prefix) = cidr
            .split_once('/')
            .wrap_err(format!("CIDR block has no prefix length: {cidr}"))?;

        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| eyre!("Invalid address in CIDR block: {cidr}"))?;

        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .wrap_err(format!("Invalid prefix length in CIDR block: {cidr}"))?;

        Ok(Cidr { address, prefix })
    }
}

fn is_placeholder(value: &str) -> bool {
    let value = value.trim();

    value.is_empty()
        || (value.starts_with('<') && value.ends_with('>'))
        || PLACEHOLDERS.iter().any(|p| value.contains(p))
}

impl InfraConfig {
    /// Apply account and region from the process environment
    ///
    /// Variables win over the file. Region falls back to the default when neither is set.
    pub fn with_env(mut self, vars: impl Fn(&str) -> Option<String>) -> Self {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| vars(name))
                .find(|v| !v.trim().is_empty())
        };

        if let Some(account) = first(&["BRANCHSTACK_ACCOUNT", "AWS_ACCOUNT_ID"]) {
            self.environment.account = account;
        }

        if let Some(region) = first(&["BRANCHSTACK_REGION", "AWS_REGION", "AWS_DEFAULT_REGION"]) {
            self.environment.region = region;
        }

        self
    }

    /// Reject the config if any required value is missing or still a placeholder
    ///
    /// All problems are reported at once.
    pub fn validate(&self) -> eyre::Result<()> {
        let mut problems = vec![];

        let mut required = |field: &str, value: &str| {
            if is_placeholder(value) {
                problems.push(format!("{field} is not set"));
            }
        };

        required("app.name", &self.app.name);
        required("app.tag", &self.app.tag);
        required("environment.account", &self.environment.account);
        required("environment.region", &self.environment.region);
        required("network.cidr", &self.network.cidr);
        required("database.snapshot_identifier", &self.database.snapshot_identifier);
        required("database.name", &self.database.name);
        required("database.user", &self.database.user);
        required("database.instance_class", &self.database.instance_class);
        required("database.credential_name", &self.database.credential_name);
        required("service.repository_arn", &self.service.repository_arn);
        required("service.container_name", &self.service.container_name);

        // Stack and database identifiers must start with a letter
        if !is_placeholder(&self.app.name)
            && !(self.app.name.len() <= 24
                && Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$")?.is_match(&self.app.name))
        {
            problems.push(format!(
                "app.name must be lowercase alphanumeric words joined by single hyphens, at most 24 characters: {}",
                self.app.name
            ));
        }

        if !is_placeholder(&self.environment.account)
            && !Regex::new(r"^\d{12}$")?.is_match(&self.environment.account)
        {
            problems.push(format!(
                "environment.account must be a 12 digit account id: {}",
                self.environment.account
            ));
        }

        // Load balancers and database subnet groups span at least two zones
        let azs_in_range = MAX_AZS.contains(&self.network.max_azs);

        if !azs_in_range {
            problems.push(format!(
                "network.max_azs must be between {} and {}: {}",
                MAX_AZS.start(),
                MAX_AZS.end(),
                self.network.max_azs
            ));
        }

        if azs_in_range && !is_placeholder(&self.network.cidr) {
            match Cidr::parse(&self.network.cidr) {
                Ok(cidr) if cidr.prefix + self.subnet_bits() > SUBNET_PREFIX => problems.push(
                    format!("network.cidr is too small for the subnets: {}", self.network.cidr),
                ),
                Ok(_) => {}
                Err(e) => problems.push(e.to_string()),
            }
        }

        if self.network.allowed_cidrs.is_empty() {
            problems.push("network.allowed_cidrs must list at least one address".into());
        }

        for cidr in &self.network.allowed_cidrs {
            if is_placeholder(cidr) {
                problems.push("network.allowed_cidrs contains a placeholder".into());
            } else if let Err(e) = Cidr::parse(cidr) {
                problems.push(e.to_string());
            }
        }

        if !is_placeholder(&self.service.repository_arn) {
            if let Err(e) = RepositoryArn::parse(&self.service.repository_arn) {
                problems.push(e.to_string());
            }
        }

        for (field, port) in [
            ("service.port", self.service.port),
            ("database.port", self.database.port),
        ] {
            if port == 0 {
                problems.push(format!("{field} must not be 0"));
            }
        }

        if self.service.port == 80 {
            problems.push("service.port must differ from the standard listener port 80".into());
        }

        if self.service.desired_count == 0 {
            problems.push("service.desired_count must be at least 1".into());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(eyre!("Invalid configuration:\n  {}", problems.join("\n  ")))
        }
    }

    /// Number of subnets: one public and one isolated per availability zone
    pub fn subnet_count(&self) -> u32 {
        u32::from(self.network.max_azs) * 2
    }

    /// Bits taken from the host part of the VPC block to number the subnets
    pub fn subnet_bits(&self) -> u8 {
        let count = self.subnet_count().max(1);
        (u32::BITS - (count - 1).leading_zeros()) as u8
    }

    /// The repository ARN, already validated
    pub fn repository(&self) -> eyre::Result<RepositoryArn> {
        RepositoryArn::parse(&self.service.repository_arn)
    }

    /// Host bits of each subnet, as `Fn::Cidr` expects them
    pub fn subnet_host_bits(&self) -> u8 {
        32 - SUBNET_PREFIX
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A config that passes validation
    pub(crate) fn valid() -> InfraConfig {
        let mut config = InfraConfig::default();
        config.environment.account = "123456789012".into();
        config.network.allowed_cidrs = vec!["203.0.113.10/32".into(), "198.51.100.7/32".into()];
        config.database.snapshot_identifier = "app-seed-snapshot".into();
        config.service.repository_arn =
            "arn:aws:ecr:us-east-1:123456789012:repository/ecs-repo".into();
        config
    }

    #[test]
    fn valid_config_passes() {
        valid().validate().unwrap();
    }

    #[test]
    fn placeholders_are_rejected() {
        let mut config = valid();
        config.environment.account = "XXXXXXXXXXXX".into();
        config.service.repository_arn = "<repository arn>".into();
        config.database.snapshot_identifier = "CHANGE_ME".into();

        let error = config.validate().unwrap_err().to_string();
        assert!(error.contains("environment.account is not set"));
        assert!(error.contains("service.repository_arn is not set"));
        assert!(error.contains("database.snapshot_identifier is not set"));
    }

    #[test]
    fn default_config_is_incomplete() {
        let error = InfraConfig::default().validate().unwrap_err().to_string();
        assert!(error.contains("network.allowed_cidrs must list at least one address"));
    }

    #[test]
    fn small_vpc_block_is_rejected() {
        let mut config = valid();
        config.network.cidr = "10.0.0.0/23".into();
        assert!(config.validate().is_err());

        config.network.cidr = "10.0.0.0/22".into();
        config.network.max_azs = 2;
        config.validate().unwrap();
    }

    #[test]
    fn malformed_allowed_cidr_is_rejected() {
        let mut config = valid();
        config.network.allowed_cidrs.push("203.0.113.300/32".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_file() {
        let config = valid().with_env(|name| match name {
            "AWS_ACCOUNT_ID" => Some("210987654321".into()),
            "BRANCHSTACK_REGION" => Some("eu-west-1".into()),
            "AWS_REGION" => Some("us-west-2".into()),
            _ => None,
        });

        assert_eq!(config.environment.account, "210987654321");
        assert_eq!(config.environment.region, "eu-west-1");
    }

    #[test]
    fn region_falls_back_to_default() {
        let config = InfraConfig::default().with_env(|_| None);
        assert_eq!(config.environment.region, "us-east-1");
    }

    #[test]
    fn repository_uri() {
        let repository =
            RepositoryArn::parse("arn:aws:ecr:eu-central-1:123456789012:repository/team/app")
                .unwrap();

        assert_eq!(
            repository.uri(),
            "123456789012.dkr.ecr.eu-central-1.amazonaws.com/team/app"
        );
    }

    #[test]
    fn subnet_bits_cover_all_subnets() {
        let mut config = valid();

        for (azs, bits) in [(1, 1), (2, 2), (3, 3)] {
            config.network.max_azs = azs;
            assert_eq!(config.subnet_bits(), bits);
        }
    }

    #[test]
    fn single_az_is_rejected() {
        let mut config = valid();
        config.network.max_azs = 1;

        let error = config.validate().unwrap_err().to_string();
        assert!(error.contains("network.max_azs must be between 2 and 3: 1"));
    }

    #[test]
    fn oversized_az_count_is_reported() {
        let mut config = valid();

        for azs in [4, 128, 200, u8::MAX] {
            config.network.max_azs = azs;
            let error = config.validate().unwrap_err().to_string();
            assert!(error.contains("network.max_azs must be between 2 and 3"), "{azs}");
        }

        assert_eq!(config.subnet_count(), 510);
    }

    #[test]
    fn app_name_makes_valid_identifiers() {
        let mut config = valid();

        for name in ["app-", "app--web", "-app", "1app", "App", "a-very-long-application-name"] {
            config.app.name = name.into();
            let error = config.validate().unwrap_err().to_string();
            assert!(error.contains("app.name must be"), "{name}");
        }

        for name in ["app", "shop-web", "a1-b2-c3"] {
            config.app.name = name.into();
            config.validate().unwrap();
        }
    }

    #[test]
    fn parses_from_toml() {
        let config: InfraConfig = toml::from_str(
            r#"
            [network]
            allowed_cidrs = ["203.0.113.10/32"]

            [service]
            repository_arn = "arn:aws:ecr:us-east-1:123456789012:repository/ecs-repo"
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.service.port, 8080);
        assert_eq!(config.service.cpu, 256);
        assert_eq!(config.network.cidr, "10.0.0.0/16");
        assert_eq!(config.app.name, "ecs-repo-branch");
    }
}
