use crate::config::InfraConfig;
use crate::lookup::LookupKey;
use crate::template::intrinsic::{
    availability_zone, cidr, fn_ref, get_att, import_value, join, split, sub,
};
use crate::template::sanitize::logical_id;
use crate::template::{CfnResource, Template};
use serde_json::{json, Value};

/// References to shared resources a branch stack is built on
///
/// Only the shared stack hands these out, so a branch stack can not be declared without the
/// shared stack being declared first. Values are imports of the shared stack's exports.
#[derive(Debug, Clone)]
pub struct SharedRefs {
    pub(crate) cluster_arn: Value,
    pub(crate) cluster_name: Value,
    pub(crate) app_security_group_id: Value,
    pub(crate) data_security_group_id: Value,
    pub(crate) public_subnet_ids: Value,
    pub(crate) subnet_ids: Value,
    pub(crate) credential_arn: Value,
    pub(crate) execution_role_arn: Value,
    pub(crate) task_role_arn: Value,
}

/// Network, security groups, cluster, credential, endpoints and roles
///
/// Long-lived, one per environment.
#[derive(Debug, Clone)]
pub struct SharedStack {
    template: Template,
    refs: SharedRefs,
}

/// An output of the shared stack consumed by branch stacks
struct Export {
    output: &'static str,
    value: Value,
}

impl SharedStack {
    pub fn stack_name(config: &InfraConfig) -> String {
        format!("{}-shared", config.app.name)
    }

    pub fn new(config: &InfraConfig) -> Self {
        let stack_name = Self::stack_name(config);

        let mut stack = SharedStack {
            template: Template::new(
                &stack_name,
                &format!("Shared network, cluster and credentials of {}", config.app.name),
                vec![("App".into(), config.app.tag.clone())],
            ),
            refs: SharedRefs::imported(&stack_name),
        };

        stack.network(config);
        stack.security_groups(config);
        stack.endpoints(config);
        stack.cluster(config);
        stack.credential(config);
        stack.roles(config);
        stack.exports(config);

        stack
            .template
            .publish(LookupKey::VpcId, &config.app.lookup_namespace, fn_ref("Vpc"));

        stack
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn refs(&self) -> &SharedRefs {
        &self.refs
    }

    fn add(&mut self, name: &str, resource: Value) {
        self.template.add_resource(CfnResource::new(name, resource));
    }

    /// VPC with a public and an isolated subnet per availability zone
    ///
    /// Isolated subnets have no route to the internet, platform services are reached through
    /// the endpoints.
    fn network(&mut self, config: &InfraConfig) {
        let azs = config.network.max_azs as usize;
        let count = config.subnet_count();
        let host_bits = config.subnet_host_bits();

        self.add(
            "Vpc",
            json!({
                "Type": "AWS::EC2::VPC",
                "Properties": {
                    "CidrBlock": config.network.cidr,
                    "EnableDnsHostnames": true,
                    "EnableDnsSupport": true,
                }
            }),
        );

        self.add(
            "InternetGateway",
            json!({"Type": "AWS::EC2::InternetGateway", "Properties": {}}),
        );

        self.add(
            "VpcGatewayAttachment",
            json!({
                "Type": "AWS::EC2::VPCGatewayAttachment",
                "Properties": {
                    "VpcId": fn_ref("Vpc"),
                    "InternetGatewayId": fn_ref("InternetGateway"),
                }
            }),
        );

        for table in ["PublicRouteTable", "IsolatedRouteTable"] {
            self.add(
                table,
                json!({
                    "Type": "AWS::EC2::RouteTable",
                    "Properties": {"VpcId": fn_ref("Vpc")}
                }),
            );
        }

        self.add(
            "PublicDefaultRoute",
            json!({
                "Type": "AWS::EC2::Route",
                "DependsOn": "VpcGatewayAttachment",
                "Properties": {
                    "RouteTableId": fn_ref("PublicRouteTable"),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": fn_ref("InternetGateway"),
                }
            }),
        );

        // Public subnets take the first blocks, isolated ones the following
        for (kind, offset, public) in [("Public", 0, true), ("Isolated", azs, false)] {
            for az in 0..azs {
                let subnet = format!("{kind}Subnet{}", az + 1);

                self.add(
                    &subnet,
                    json!({
                        "Type": "AWS::EC2::Subnet",
                        "Properties": {
                            "VpcId": fn_ref("Vpc"),
                            "AvailabilityZone": availability_zone(az),
                            "CidrBlock": cidr(get_att("Vpc", "CidrBlock"), count, host_bits, offset + az),
                            "MapPublicIpOnLaunch": public,
                        }
                    }),
                );

                self.add(
                    &format!("{subnet}RouteTableAssociation"),
                    json!({
                        "Type": "AWS::EC2::SubnetRouteTableAssociation",
                        "Properties": {
                            "SubnetId": fn_ref(&subnet),
                            "RouteTableId": fn_ref(&format!("{kind}RouteTable")),
                        }
                    }),
                );
            }
        }
    }

    fn subnets(config: &InfraConfig, kind: &str) -> Vec<Value> {
        (1..=config.network.max_azs)
            .map(|az| fn_ref(&format!("{kind}Subnet{az}")))
            .collect()
    }

    /// App tier and data tier boundaries
    ///
    /// The data tier admits database traffic from the app tier and from the allow-listed
    /// addresses.
    fn security_groups(&mut self, config: &InfraConfig) {
        let app_ingress: Vec<Value> = config
            .network
            .allowed_cidrs
            .iter()
            .flat_map(|source| {
                [80, config.service.port].map(|port| {
                    json!({
                        "IpProtocol": "tcp",
                        "FromPort": port,
                        "ToPort": port,
                        "CidrIp": source,
                    })
                })
            })
            .collect();

        self.add(
            "AppSecurityGroup",
            json!({
                "Type": "AWS::EC2::SecurityGroup",
                "Properties": {
                    "GroupDescription": format!("{} application tier", config.app.name),
                    "VpcId": fn_ref("Vpc"),
                    "SecurityGroupIngress": app_ingress,
                }
            }),
        );

        // Load balancer to containers, both sit in the app tier
        self.add(
            "AppSecurityGroupSelfIngress",
            json!({
                "Type": "AWS::EC2::SecurityGroupIngress",
                "Properties": {
                    "GroupId": get_att("AppSecurityGroup", "GroupId"),
                    "SourceSecurityGroupId": get_att("AppSecurityGroup", "GroupId"),
                    "IpProtocol": "tcp",
                    "FromPort": config.service.port,
                    "ToPort": config.service.port,
                }
            }),
        );

        let port = config.database.port;

        let mut data_ingress = vec![json!({
            "IpProtocol": "tcp",
            "FromPort": port,
            "ToPort": port,
            "SourceSecurityGroupId": get_att("AppSecurityGroup", "GroupId"),
        })];

        data_ingress.extend(config.network.allowed_cidrs.iter().map(|source| {
            json!({
                "IpProtocol": "tcp",
                "FromPort": port,
                "ToPort": port,
                "CidrIp": source,
            })
        }));

        self.add(
            "DataSecurityGroup",
            json!({
                "Type": "AWS::EC2::SecurityGroup",
                "Properties": {
                    "GroupDescription": format!("{} data tier", config.app.name),
                    "VpcId": fn_ref("Vpc"),
                    "SecurityGroupIngress": data_ingress,
                }
            }),
        );

        self.add(
            "EndpointSecurityGroup",
            json!({
                "Type": "AWS::EC2::SecurityGroup",
                "Properties": {
                    "GroupDescription": format!("{} platform endpoints", config.app.name),
                    "VpcId": fn_ref("Vpc"),
                    "SecurityGroupIngress": [{
                        "IpProtocol": "tcp",
                        "FromPort": 443,
                        "ToPort": 443,
                        "CidrIp": get_att("Vpc", "CidrBlock"),
                    }],
                }
            }),
        );
    }

    /// Private routes to the platform services the cluster needs
    ///
    /// Image layers are served from S3, so S3 gets a gateway endpoint on the isolated route
    /// table next to the interface endpoints.
    fn endpoints(&mut self, config: &InfraConfig) {
        for service in &config.network.interface_endpoints {
            self.add(
                &logical_id("Endpoint", service),
                json!({
                    "Type": "AWS::EC2::VPCEndpoint",
                    "Properties": {
                        "VpcId": fn_ref("Vpc"),
                        "ServiceName": sub(&format!("com.amazonaws.${{AWS::Region}}.{service}")),
                        "VpcEndpointType": "Interface",
                        "PrivateDnsEnabled": true,
                        "SubnetIds": Self::subnets(config, "Isolated"),
                        "SecurityGroupIds": [get_att("EndpointSecurityGroup", "GroupId")],
                    }
                }),
            );
        }

        self.add(
            "EndpointS3",
            json!({
                "Type": "AWS::EC2::VPCEndpoint",
                "Properties": {
                    "VpcId": fn_ref("Vpc"),
                    "ServiceName": sub("com.amazonaws.${AWS::Region}.s3"),
                    "VpcEndpointType": "Gateway",
                    "RouteTableIds": [fn_ref("IsolatedRouteTable")],
                }
            }),
        );
    }

    fn cluster(&mut self, config: &InfraConfig) {
        self.add(
            "Cluster",
            json!({
                "Type": "AWS::ECS::Cluster",
                "Properties": {
                    "ClusterName": config.app.name,
                    "CapacityProviders": ["FARGATE"],
                }
            }),
        );
    }

    /// Administrative database credential
    ///
    /// Retained when the stack is deleted, branch databases restored from the snapshot keep
    /// using it.
    fn credential(&mut self, config: &InfraConfig) {
        self.add(
            "DatabaseCredential",
            json!({
                "Type": "AWS::SecretsManager::Secret",
                "DeletionPolicy": "Retain",
                "UpdateReplacePolicy": "Retain",
                "Properties": {
                    "Name": config.database.credential_name,
                    "Description": format!("Administrative database credential of {}", config.app.name),
                    "GenerateSecretString": {
                        "SecretStringTemplate": json!({"username": config.database.user}).to_string(),
                        "GenerateStringKey": "password",
                        "ExcludePunctuation": true,
                        "PasswordLength": 30,
                    },
                }
            }),
        );
    }

    /// Image pull, log write, secret read and parameter read
    fn task_policy(config: &InfraConfig) -> Value {
        let parameters = LookupKey::VpcId
            .parameter_name(&config.app.lookup_namespace)
            .trim_start_matches('/')
            .trim_end_matches("vpcid")
            .to_string();

        json!([{
            "PolicyName": "TaskAccess",
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [
                    {
                        "Effect": "Allow",
                        "Action": ["ecr:GetAuthorizationToken"],
                        "Resource": "*",
                    },
                    {
                        "Effect": "Allow",
                        "Action": [
                            "ecr:BatchCheckLayerAvailability",
                            "ecr:GetDownloadUrlForLayer",
                            "ecr:BatchGetImage",
                        ],
                        "Resource": config.service.repository_arn,
                    },
                    {
                        "Effect": "Allow",
                        "Action": ["logs:CreateLogStream", "logs:PutLogEvents"],
                        "Resource": sub(&format!(
                            "arn:${{AWS::Partition}}:logs:${{AWS::Region}}:${{AWS::AccountId}}:log-group:/{}/*",
                            config.app.name
                        )),
                    },
                    {
                        "Effect": "Allow",
                        "Action": ["secretsmanager:GetSecretValue"],
                        "Resource": fn_ref("DatabaseCredential"),
                    },
                    {
                        "Effect": "Allow",
                        "Action": ["ssm:GetParameter", "ssm:GetParameters"],
                        "Resource": sub(&format!(
                            "arn:${{AWS::Partition}}:ssm:${{AWS::Region}}:${{AWS::AccountId}}:parameter/{parameters}*"
                        )),
                    },
                ]
            }
        }])
    }

    fn roles(&mut self, config: &InfraConfig) {
        for role in ["ExecutionRole", "TaskRole"] {
            self.add(
                role,
                json!({
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "AssumeRolePolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [{
                                "Effect": "Allow",
                                "Principal": {"Service": ["ecs-tasks.amazonaws.com"]},
                                "Action": ["sts:AssumeRole"],
                            }]
                        },
                        "Path": "/",
                        "Policies": Self::task_policy(config),
                    }
                }),
            );
        }
    }

    fn exports(&mut self, config: &InfraConfig) {
        let stack_name = Self::stack_name(config);

        let exports = [
            Export {
                output: "ClusterArn",
                value: get_att("Cluster", "Arn"),
            },
            Export {
                output: "ClusterName",
                value: fn_ref("Cluster"),
            },
            Export {
                output: "AppSecurityGroupId",
                value: get_att("AppSecurityGroup", "GroupId"),
            },
            Export {
                output: "DataSecurityGroupId",
                value: get_att("DataSecurityGroup", "GroupId"),
            },
            Export {
                output: "PublicSubnetIds",
                value: join(",", Self::subnets(config, "Public")),
            },
            Export {
                output: "SubnetIds",
                value: join(",", Self::subnets(config, "Isolated")),
            },
            Export {
                output: "CredentialArn",
                value: fn_ref("DatabaseCredential"),
            },
            Export {
                output: "ExecutionRoleArn",
                value: get_att("ExecutionRole", "Arn"),
            },
            Export {
                output: "TaskRoleArn",
                value: get_att("TaskRole", "Arn"),
            },
        ];

        for Export { output, value } in exports {
            self.template
                .add_output(output, value, Some(&export_name(&stack_name, output)));
        }

        self.template.add_output("VpcId", fn_ref("Vpc"), None);
    }
}

fn export_name(stack_name: &str, output: &str) -> String {
    format!("{stack_name}-{output}")
}

impl SharedRefs {
    fn imported(stack_name: &str) -> Self {
        let import = |output: &str| import_value(&export_name(stack_name, output));

        SharedRefs {
            cluster_arn: import("ClusterArn"),
            cluster_name: import("ClusterName"),
            app_security_group_id: import("AppSecurityGroupId"),
            data_security_group_id: import("DataSecurityGroupId"),
            public_subnet_ids: split(",", import("PublicSubnetIds")),
            subnet_ids: split(",", import("SubnetIds")),
            credential_arn: import("CredentialArn"),
            execution_role_arn: import("ExecutionRoleArn"),
            task_role_arn: import("TaskRoleArn"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::valid;

    fn resources_of_type<'a>(template: &'a Template, kind: &str) -> Vec<&'a String> {
        template
            .resources()
            .iter()
            .filter(|(_, r)| r["Type"] == kind)
            .map(|(name, _)| name)
            .collect()
    }

    #[test]
    fn declares_network_per_az() {
        let mut config = valid();
        config.network.max_azs = 3;
        let stack = SharedStack::new(&config);
        let template = stack.template();

        assert_eq!(resources_of_type(template, "AWS::EC2::Subnet").len(), 6);

        // Isolated subnets are numbered after the public ones
        assert_eq!(
            template.resource("IsolatedSubnet1").unwrap()["Properties"]["CidrBlock"],
            cidr(get_att("Vpc", "CidrBlock"), 6, 8, 3)
        );
    }

    #[test]
    fn credential_is_retained() {
        let stack = SharedStack::new(&valid());
        let credential = stack.template().resource("DatabaseCredential").unwrap();
        assert_eq!(credential["DeletionPolicy"], "Retain");
        assert_eq!(credential["UpdateReplacePolicy"], "Retain");
    }

    #[test]
    fn data_tier_admits_app_tier() {
        let stack = SharedStack::new(&valid());
        let ingress = &stack.template().resource("DataSecurityGroup").unwrap()["Properties"]
            ["SecurityGroupIngress"];

        assert_eq!(
            ingress[0]["SourceSecurityGroupId"],
            get_att("AppSecurityGroup", "GroupId")
        );
        assert_eq!(ingress[0]["FromPort"], 5432);

        // One rule per allow-listed address on top of the app tier rule
        assert_eq!(ingress.as_array().unwrap().len(), 3);
    }

    #[test]
    fn endpoint_per_platform_service() {
        let stack = SharedStack::new(&valid());
        let endpoints = resources_of_type(stack.template(), "AWS::EC2::VPCEndpoint");
        assert_eq!(endpoints.len(), 6);
        assert!(stack.template().resource("EndpointEcrDOTapi").is_some());
    }

    #[test]
    fn publishes_vpc_id_only() {
        let stack = SharedStack::new(&valid());
        assert_eq!(stack.template().published(), &[LookupKey::VpcId]);

        let parameter = stack.template().resource("VpcIdParameter").unwrap();
        assert_eq!(parameter["Properties"]["Name"], "vpcid");
        assert_eq!(parameter["Properties"]["Value"], fn_ref("Vpc"));
    }

    #[test]
    fn roles_carry_minimal_permissions() {
        let stack = SharedStack::new(&valid());

        for role in ["ExecutionRole", "TaskRole"] {
            let statements = &stack.template().resource(role).unwrap()["Properties"]["Policies"]
                [0]["PolicyDocument"]["Statement"];

            let actions: Vec<&str> = statements
                .as_array()
                .unwrap()
                .iter()
                .flat_map(|s| s["Action"].as_array().unwrap())
                .map(|a| a.as_str().unwrap())
                .collect();

            for action in [
                "ecr:BatchGetImage",
                "logs:PutLogEvents",
                "secretsmanager:GetSecretValue",
                "ssm:GetParameter",
            ] {
                assert!(actions.contains(&action), "{role} lacks {action}");
            }
        }
    }

    #[test]
    fn refs_import_exports() {
        let config = valid();
        let stack = SharedStack::new(&config);
        let outputs = stack.template().outputs();

        assert_eq!(
            outputs["ClusterArn"]["Export"]["Name"],
            "ecs-repo-branch-shared-ClusterArn"
        );
        assert_eq!(
            stack.refs().cluster_arn,
            import_value("ecs-repo-branch-shared-ClusterArn")
        );
    }

    #[test]
    fn every_resource_has_app_tag_only() {
        let stack = SharedStack::new(&valid());

        for (name, resource) in stack.template().resources() {
            let Some(tags) = resource["Properties"].get("Tags") else {
                continue;
            };

            let expected = if resource["Type"] == "AWS::SSM::Parameter" {
                json!({"App": "ecs-repo-branch"})
            } else {
                json!([{"Key": "App", "Value": "ecs-repo-branch"}])
            };

            assert_eq!(tags, &expected, "unexpected tags on {name}");
        }
    }
}
