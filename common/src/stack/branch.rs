use crate::config::InfraConfig;
use crate::context::BranchContext;
use crate::lookup::{check_parameter_name, LookupKey, LookupStore};
use crate::stack::names::BranchNames;
use crate::stack::shared::SharedRefs;
use crate::template::intrinsic::{fn_ref, get_att, join};
use crate::template::{CfnResource, Template};
use eyre::WrapErr;
use serde_json::{json, Value};

/// Ports the load balancer listens on
///
/// Port 80 for regular access, the service port for direct access during development. Both
/// forward to the same target pool.
fn listener_ports(config: &InfraConfig) -> [(&'static str, u16); 2] {
    [
        ("HttpListener", 80),
        ("ServicePortListener", config.service.port),
    ]
}

/// Load balancer, database, task definition and service of one branch
#[derive(Debug, Clone)]
pub struct BranchStack {
    template: Template,
    names: BranchNames,
}

impl BranchStack {
    /// Declare the branch resources on top of the shared ones
    ///
    /// The VPC id is the only value taken from the lookup store, it must have been published
    /// by a deployed shared stack.
    pub async fn new(
        config: &InfraConfig,
        context: &BranchContext,
        shared: &SharedRefs,
        store: &dyn LookupStore,
    ) -> eyre::Result<Self> {
        let vpc_id = store
            .require(&LookupKey::VpcId)
            .await
            .wrap_err("Failed to resolve the shared network")?;

        log::info!("Resolved VPC {vpc_id} for branch {}", context.branch());

        for key in LookupKey::branch_keys(context.branch()) {
            check_parameter_name(&key.parameter_name(&config.app.lookup_namespace))?;
        }

        let names = BranchNames::new(&config.app.name, context.branch());
        let repository = config.repository()?;

        let mut stack = BranchStack {
            template: Template::new(
                &names.stack,
                &format!(
                    "Service of branch {} at version {}",
                    context.branch(),
                    context.version()
                ),
                vec![
                    ("App".into(), config.app.tag.clone()),
                    ("branch".into(), context.branch().to_string()),
                    ("version".into(), context.version().to_string()),
                ],
            ),
            names,
        };

        stack.load_balancer(config, shared, &vpc_id);
        stack.database(config, shared);
        stack.task_definition(config, shared, &format!("{}:{}", repository.uri(), context.version()));
        stack.service(config, shared);
        stack.publish(config, context);

        Ok(stack)
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn into_template(self) -> Template {
        self.template
    }

    pub fn names(&self) -> &BranchNames {
        &self.names
    }

    fn add(&mut self, name: &str, resource: Value) {
        self.template.add_resource(CfnResource::new(name, resource));
    }

    fn load_balancer(&mut self, config: &InfraConfig, shared: &SharedRefs, vpc_id: &str) {
        let port = config.service.port;

        self.add(
            "TargetGroup",
            json!({
                "Type": "AWS::ElasticLoadBalancingV2::TargetGroup",
                "Properties": {
                    "Name": self.names.target_group,
                    "Protocol": "HTTP",
                    "Port": port,
                    "TargetType": "ip",
                    "VpcId": vpc_id,
                    "HealthCheckProtocol": "HTTP",
                    "HealthCheckPort": port.to_string(),
                    "HealthCheckPath": config.service.health_check_path,
                }
            }),
        );

        self.add(
            "LoadBalancer",
            json!({
                "Type": "AWS::ElasticLoadBalancingV2::LoadBalancer",
                "Properties": {
                    "Name": self.names.load_balancer,
                    "Type": "application",
                    "Scheme": "internet-facing",
                    "Subnets": shared.public_subnet_ids,
                    "SecurityGroups": [shared.app_security_group_id],
                }
            }),
        );

        for (listener, port) in listener_ports(config) {
            self.add(
                listener,
                json!({
                    "Type": "AWS::ElasticLoadBalancingV2::Listener",
                    "Properties": {
                        "LoadBalancerArn": fn_ref("LoadBalancer"),
                        "Port": port,
                        "Protocol": "HTTP",
                        "DefaultActions": [{
                            "Type": "forward",
                            "TargetGroupArn": fn_ref("TargetGroup"),
                        }],
                    }
                }),
            );
        }
    }

    /// Database restored from the seed snapshot
    ///
    /// Branch databases are disposable: no backups, deleted with the stack.
    fn database(&mut self, config: &InfraConfig, shared: &SharedRefs) {
        self.add(
            "DatabaseSubnetGroup",
            json!({
                "Type": "AWS::RDS::DBSubnetGroup",
                "Properties": {
                    "DBSubnetGroupDescription": format!("Subnets of {}", self.names.database),
                    "SubnetIds": shared.public_subnet_ids,
                }
            }),
        );

        self.add(
            "Database",
            json!({
                "Type": "AWS::RDS::DBInstance",
                "DeletionPolicy": "Delete",
                "UpdateReplacePolicy": "Delete",
                "Properties": {
                    "DBInstanceIdentifier": self.names.database,
                    "DBSnapshotIdentifier": config.database.snapshot_identifier,
                    "DBInstanceClass": config.database.instance_class,
                    "DBSubnetGroupName": fn_ref("DatabaseSubnetGroup"),
                    "VPCSecurityGroups": [shared.data_security_group_id],
                    "Port": config.database.port.to_string(),
                    "PubliclyAccessible": true,
                    "MultiAZ": false,
                    "BackupRetentionPeriod": 0,
                    "DeletionProtection": false,
                    "MasterUserPassword": join("", vec![
                        json!("{{resolve:secretsmanager:"),
                        shared.credential_arn.clone(),
                        json!(":SecretString:password}}"),
                    ]),
                }
            }),
        );
    }

    /// Task definition running the image tagged with the version
    ///
    /// The password is a secret reference resolved when the container starts, it never appears
    /// in the definition itself.
    fn task_definition(&mut self, config: &InfraConfig, shared: &SharedRefs, image: &str) {
        let region = &config.environment.region;

        self.add(
            "LogGroup",
            json!({
                "Type": "AWS::Logs::LogGroup",
                "DeletionPolicy": "Delete",
                "Properties": {
                    "LogGroupName": self.names.log_group,
                    "RetentionInDays": config.service.log_retention_days,
                }
            }),
        );

        self.add(
            "TaskDefinition",
            json!({
                "Type": "AWS::ECS::TaskDefinition",
                "Properties": {
                    "Family": self.names.task_family,
                    "Cpu": config.service.cpu.to_string(),
                    "Memory": config.service.memory.to_string(),
                    "NetworkMode": "awsvpc",
                    "RequiresCompatibilities": ["FARGATE"],
                    "ExecutionRoleArn": shared.execution_role_arn,
                    "TaskRoleArn": shared.task_role_arn,
                    "ContainerDefinitions": [{
                        "Name": config.service.container_name,
                        "Image": image,
                        "Essential": true,
                        "PortMappings": [{
                            "ContainerPort": config.service.port,
                            "Protocol": "tcp",
                        }],
                        "Environment": [
                            {"Name": "DB_HOST", "Value": get_att("Database", "Endpoint.Address")},
                            {"Name": "DB_NAME", "Value": config.database.name},
                            {"Name": "DB_USER", "Value": config.database.user},
                            {"Name": "NO_COLOR", "Value": "1"},
                        ],
                        "Secrets": [{
                            "Name": "DB_PASSWORD",
                            "ValueFrom": join("", vec![shared.credential_arn.clone(), json!(":password::")]),
                        }],
                        "LogConfiguration": {
                            "LogDriver": "awslogs",
                            "Options": {
                                "awslogs-group": fn_ref("LogGroup"),
                                "awslogs-region": region,
                                "awslogs-stream-prefix": self.names.log_stream_prefix,
                            }
                        },
                    }],
                }
            }),
        );
    }

    /// Service registered into the target pool
    ///
    /// The circuit breaker stops a failing rollout but does not roll it back, failures are
    /// handled by hand.
    fn service(&mut self, config: &InfraConfig, shared: &SharedRefs) {
        let listeners: Vec<&str> = listener_ports(config).iter().map(|(l, _)| *l).collect();

        self.add(
            "Service",
            json!({
                "Type": "AWS::ECS::Service",
                // Targets can only be registered once the group is attached to a listener
                "DependsOn": listeners,
                "Properties": {
                    "ServiceName": self.names.service,
                    "Cluster": shared.cluster_arn,
                    "LaunchType": "FARGATE",
                    "TaskDefinition": fn_ref("TaskDefinition"),
                    "DesiredCount": config.service.desired_count,
                    "HealthCheckGracePeriodSeconds": 60,
                    "DeploymentConfiguration": {
                        "MinimumHealthyPercent": 100,
                        "MaximumPercent": 200,
                        "DeploymentCircuitBreaker": {
                            "Enable": true,
                            "Rollback": false,
                        },
                    },
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": "DISABLED",
                            "Subnets": shared.subnet_ids,
                            "SecurityGroups": [shared.app_security_group_id],
                        }
                    },
                    "LoadBalancers": [{
                        "ContainerName": config.service.container_name,
                        "ContainerPort": config.service.port,
                        "TargetGroupArn": fn_ref("TargetGroup"),
                    }],
                }
            }),
        );

        self.template.add_output("ClusterName", shared.cluster_name.clone(), None);
        self.template.add_output("ServiceName", get_att("Service", "Name"), None);
    }

    /// Values for post-deploy tooling, keyed by branch
    fn publish(&mut self, config: &InfraConfig, context: &BranchContext) {
        let namespace = &config.app.lookup_namespace;
        let [db_host, service_arn, alb_dns_name] = LookupKey::branch_keys(context.branch());

        self.template
            .publish(db_host, namespace, get_att("Database", "Endpoint.Address"));
        self.template
            .publish(service_arn, namespace, fn_ref("Service"));
        self.template
            .publish(alb_dns_name, namespace, get_att("LoadBalancer", "DNSName"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::valid;
    use crate::lookup::MemoryLookupStore;
    use crate::stack::shared::SharedStack;

    async fn published_store() -> MemoryLookupStore {
        let store = MemoryLookupStore::new();
        store.put(&LookupKey::VpcId, "vpc-0abc").await.unwrap();
        store
    }

    async fn branch(branch: &str, version: &str) -> BranchStack {
        let config = valid();
        let shared = SharedStack::new(&config);
        let context = BranchContext::new(branch, version).unwrap();

        BranchStack::new(&config, &context, shared.refs(), &published_store().await)
            .await
            .unwrap()
    }

    fn properties<'a>(stack: &'a BranchStack, name: &str) -> &'a Value {
        &stack.template().resource(name).unwrap()["Properties"]
    }

    #[tokio::test]
    async fn fails_before_vpc_is_published() {
        let config = valid();
        let shared = SharedStack::new(&config);
        let context = BranchContext::new("main", "v1").unwrap();

        let error = BranchStack::new(&config, &context, shared.refs(), &MemoryLookupStore::new())
            .await
            .unwrap_err();

        assert!(format!("{error:?}").contains("vpcid"));
    }

    #[tokio::test]
    async fn namespace_counts_toward_parameter_depth() {
        let mut config = valid();
        config.app.lookup_namespace = "/team/apps".into();
        let shared = SharedStack::new(&config);
        let context = BranchContext::new(&format!("{}b", "a/".repeat(13)), "v1").unwrap();

        assert!(
            BranchStack::new(&config, &context, shared.refs(), &published_store().await)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn resolves_vpc_from_store() {
        let stack = branch("main", "v1").await;
        assert_eq!(properties(&stack, "TargetGroup")["VpcId"], "vpc-0abc");
    }

    #[tokio::test]
    async fn listeners_share_one_target_pool() {
        let stack = branch("main", "v1").await;

        let pools: Vec<&String> = stack
            .template()
            .resources()
            .iter()
            .filter(|(_, r)| r["Type"] == "AWS::ElasticLoadBalancingV2::TargetGroup")
            .map(|(name, _)| name)
            .collect();
        assert_eq!(pools, vec!["TargetGroup"]);

        let mut ports = vec![];

        for (name, resource) in stack.template().resources() {
            if resource["Type"] != "AWS::ElasticLoadBalancingV2::Listener" {
                continue;
            }

            let actions = &resource["Properties"]["DefaultActions"];
            assert_eq!(actions.as_array().unwrap().len(), 1, "{name}");
            assert_eq!(actions[0]["TargetGroupArn"], fn_ref("TargetGroup"));
            ports.push(resource["Properties"]["Port"].as_u64().unwrap());
        }

        ports.sort();
        assert_eq!(ports, vec![80, 5000]);
    }

    #[tokio::test]
    async fn database_is_disposable_for_any_branch() {
        for name in ["main", "feature/x", "release-2.0"] {
            let stack = branch(name, "v1").await;
            let database = stack.template().resource("Database").unwrap();

            assert_eq!(database["DeletionPolicy"], "Delete");
            assert_eq!(database["UpdateReplacePolicy"], "Delete");
            assert_eq!(database["Properties"]["BackupRetentionPeriod"], 0);
            assert_eq!(
                database["Properties"]["DBSnapshotIdentifier"],
                "app-seed-snapshot"
            );
        }
    }

    #[tokio::test]
    async fn every_taggable_resource_carries_branch_and_version() {
        let stack = branch("feature/login", "2024.05.1").await;
        let mut tagged = 0;

        for (name, resource) in stack.template().resources() {
            let Some(tags) = resource["Properties"].get("Tags") else {
                continue;
            };

            let lookup = |key: &str| match tags {
                Value::Array(list) => list
                    .iter()
                    .find(|t| t["Key"] == key)
                    .map(|t| t["Value"].clone()),
                Value::Object(map) => map.get(key).cloned(),
                _ => None,
            };

            assert_eq!(lookup("branch"), Some(json!("feature/login")), "{name}");
            assert_eq!(lookup("version"), Some(json!("2024.05.1")), "{name}");
            assert_eq!(lookup("App"), Some(json!("ecs-repo-branch")), "{name}");
            tagged += 1;
        }

        // Target group, load balancer, subnet group, database, log group, task definition,
        // service and three parameters
        assert_eq!(tagged, 10);
        assert_eq!(
            stack.template().tags().iter().find(|(k, _)| k == "version").unwrap().1,
            "2024.05.1"
        );
    }

    #[tokio::test]
    async fn container_uses_version_and_secret_password() {
        let stack = branch("main", "v7").await;
        let container = &properties(&stack, "TaskDefinition")["ContainerDefinitions"][0];

        assert_eq!(
            container["Image"],
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/ecs-repo:v7"
        );

        let environment = container["Environment"].as_array().unwrap();
        let names: Vec<&str> = environment
            .iter()
            .map(|e| e["Name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["DB_HOST", "DB_NAME", "DB_USER", "NO_COLOR"]);
        assert_eq!(environment[0]["Value"], get_att("Database", "Endpoint.Address"));
        assert!(!container.to_string().contains("\"DB_PASSWORD\",\"Value\""));
        assert_eq!(container["Secrets"][0]["Name"], "DB_PASSWORD");
    }

    #[tokio::test]
    async fn service_rollout_settings() {
        let stack = branch("main", "v1").await;
        let service = stack.template().resource("Service").unwrap();
        let deployment = &service["Properties"]["DeploymentConfiguration"];

        assert_eq!(service["Properties"]["DesiredCount"], 1);
        assert_eq!(deployment["MinimumHealthyPercent"], 100);
        assert_eq!(deployment["MaximumPercent"], 200);
        assert_eq!(deployment["DeploymentCircuitBreaker"]["Enable"], true);
        assert_eq!(deployment["DeploymentCircuitBreaker"]["Rollback"], false);
        assert_eq!(
            service["Properties"]["LoadBalancers"][0]["TargetGroupArn"],
            fn_ref("TargetGroup")
        );
        assert_eq!(
            service["DependsOn"],
            json!(["HttpListener", "ServicePortListener"])
        );
    }

    #[tokio::test]
    async fn publishes_branch_keys() {
        let stack = branch("dev", "v1").await;

        assert_eq!(
            stack.template().published(),
            &LookupKey::branch_keys("dev")
        );

        assert_eq!(
            properties(&stack, "AlbDnsNameParameter")["Name"],
            "dev-alb-dns-name"
        );
        assert_eq!(
            properties(&stack, "ServiceArnParameter")["Value"],
            fn_ref("Service")
        );
    }

    #[tokio::test]
    async fn names_derive_from_branch() {
        let stack = branch("feature/login", "v1").await;
        let names = BranchNames::new("ecs-repo-branch", "feature/login");

        assert_eq!(stack.names(), &names);
        assert_eq!(stack.template().stack_name(), names.stack);
        assert_eq!(properties(&stack, "TargetGroup")["Name"], names.target_group.as_str());
        assert_eq!(properties(&stack, "LoadBalancer")["Name"], names.load_balancer.as_str());
        assert_eq!(properties(&stack, "TaskDefinition")["Family"], names.task_family.as_str());
        assert_eq!(properties(&stack, "Service")["ServiceName"], names.service.as_str());
        assert_eq!(
            properties(&stack, "Database")["DBInstanceIdentifier"],
            names.database.as_str()
        );
    }
}
