pub mod intrinsic;
pub mod sanitize;

use crate::lookup::LookupKey;
use eyre::WrapErr;
use serde_json::{json, Map, Value};

/// Key and value of a tag
pub type Tag = (String, String);

/// One logical resource of a template
#[derive(Clone, Debug)]
pub struct CfnResource {
    pub name: String,
    pub resource: Value,
}

impl CfnResource {
    pub fn new(name: &str, resource: Value) -> Self {
        CfnResource {
            name: name.to_string(),
            resource,
        }
    }
}

/// How a resource type accepts tags, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagFormat {
    /// [{"Key": .., "Value": ..}]
    List,

    /// {"key": "value"}
    Map,

    None,
}

fn tag_format(resource_type: &str) -> TagFormat {
    match resource_type {
        "AWS::SSM::Parameter" => TagFormat::Map,

        "AWS::EC2::VPC"
        | "AWS::EC2::Subnet"
        | "AWS::EC2::InternetGateway"
        | "AWS::EC2::RouteTable"
        | "AWS::EC2::SecurityGroup"
        | "AWS::ECS::Cluster"
        | "AWS::ECS::TaskDefinition"
        | "AWS::ECS::Service"
        | "AWS::SecretsManager::Secret"
        | "AWS::IAM::Role"
        | "AWS::ElasticLoadBalancingV2::LoadBalancer"
        | "AWS::ElasticLoadBalancingV2::TargetGroup"
        | "AWS::RDS::DBInstance"
        | "AWS::RDS::DBSubnetGroup"
        | "AWS::Logs::LogGroup" => TagFormat::List,

        _ => TagFormat::None,
    }
}

/// CFN template of a single stack
///
/// Tags given at construction are applied to every resource that supports them, and are
/// also used as stack-level tags on deploy.
#[derive(Clone, Debug)]
pub struct Template {
    stack_name: String,
    description: String,
    resources: Map<String, Value>,
    outputs: Map<String, Value>,
    tags: Vec<Tag>,

    /// Keys written to the lookup store when the stack is deployed
    published: Vec<LookupKey>,
}

impl Template {
    pub fn new(stack_name: &str, description: &str, tags: Vec<Tag>) -> Self {
        Template {
            stack_name: stack_name.to_string(),
            description: description.to_string(),
            resources: Map::new(),
            outputs: Map::new(),
            tags,
            published: vec![],
        }
    }

    /// Add a resource to the CFN template, tagging it on the way
    pub fn add_resource(&mut self, CfnResource { name, mut resource }: CfnResource) {
        let format = resource
            .get("Type")
            .and_then(Value::as_str)
            .map(tag_format)
            .unwrap_or(TagFormat::None);

        let tags = match format {
            TagFormat::List => Some(Value::Array(
                self.tags
                    .iter()
                    .map(|(key, value)| json!({ "Key": key, "Value": value }))
                    .collect(),
            )),

            TagFormat::Map => Some(Value::Object(
                self.tags
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                    .collect(),
            )),

            TagFormat::None => None,
        };

        if let (Some(tags), Some(properties)) = (
            tags,
            resource
                .get_mut("Properties")
                .and_then(Value::as_object_mut),
        ) {
            properties.insert("Tags".into(), tags);
        }

        if self.resources.contains_key(&name) {
            log::warn!("Resource {name} is declared twice, the last declaration wins");
        }

        self.resources.insert(name, resource);
    }

    /// Add a stack output, exported under `export` when given
    pub fn add_output(&mut self, name: &str, value: Value, export: Option<&str>) {
        let mut output = json!({ "Value": value });

        if let Some(export) = export {
            output["Export"] = json!({ "Name": export });
        }

        self.outputs.insert(name.to_string(), output);
    }

    /// Declare a lookup store entry, written by the provider when the stack is deployed
    pub fn publish(&mut self, key: LookupKey, namespace: &str, value: Value) {
        self.add_resource(CfnResource::new(
            key.logical_id(),
            json!({
                "Type": "AWS::SSM::Parameter",
                "Properties": {
                    "Name": key.parameter_name(namespace),
                    "Type": "String",
                    "Value": value,
                    "Description": format!("{key} published by {}", self.stack_name),
                }
            }),
        ));

        self.published.push(key);
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn published(&self) -> &[LookupKey] {
        &self.published
    }

    pub fn resources(&self) -> &Map<String, Value> {
        &self.resources
    }

    pub fn resource(&self, name: &str) -> Option<&Value> {
        self.resources.get(name)
    }

    pub fn outputs(&self) -> &Map<String, Value> {
        &self.outputs
    }

    /// The full template document
    pub fn document(&self) -> Value {
        let mut document = json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": self.description,
            "Resources": self.resources,
        });

        if !self.outputs.is_empty() {
            document["Outputs"] = Value::Object(self.outputs.clone());
        }

        document
    }

    /// Template body as sent to CloudFormation
    pub fn to_json(&self) -> eyre::Result<String> {
        serde_json::to_string_pretty(&self.document())
            .wrap_err(format!("Failed to serialize template of {}", self.stack_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> Vec<Tag> {
        vec![("App".into(), "app".into()), ("branch".into(), "dev".into())]
    }

    #[test]
    fn tags_follow_resource_type() {
        let mut template = Template::new("stack", "test", tags());

        template.add_resource(CfnResource::new(
            "Group",
            json!({"Type": "AWS::EC2::SecurityGroup", "Properties": {"GroupDescription": "x"}}),
        ));

        template.add_resource(CfnResource::new(
            "Listener",
            json!({"Type": "AWS::ElasticLoadBalancingV2::Listener", "Properties": {"Port": 80}}),
        ));

        template.publish(LookupKey::VpcId, "", json!("vpc-1"));

        assert_eq!(
            template.resource("Group").unwrap()["Properties"]["Tags"],
            json!([{"Key": "App", "Value": "app"}, {"Key": "branch", "Value": "dev"}])
        );

        assert!(template.resource("Listener").unwrap()["Properties"]
            .get("Tags")
            .is_none());

        assert_eq!(
            template.resource("VpcIdParameter").unwrap()["Properties"]["Tags"],
            json!({"App": "app", "branch": "dev"})
        );
    }

    #[test]
    fn document_shape() {
        let mut template = Template::new("stack", "test stack", vec![]);
        let document = template.document();
        assert_eq!(document["Description"], "test stack");
        assert!(document.get("Outputs").is_none());

        template.add_output("VpcId", json!({"Ref": "Vpc"}), Some("stack-VpcId"));
        let document: Value = serde_json::from_str(&template.to_json().unwrap()).unwrap();
        assert_eq!(document["Outputs"]["VpcId"]["Export"]["Name"], "stack-VpcId");
    }
}
