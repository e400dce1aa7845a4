//! CloudFormation intrinsic functions as JSON values

use serde_json::{json, Value};

pub fn fn_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn import_value(export_name: &str) -> Value {
    json!({ "Fn::ImportValue": export_name })
}

pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

pub fn split(delimiter: &str, source: Value) -> Value {
    json!({ "Fn::Split": [delimiter, source] })
}

pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// Availability zone of the current region by index
pub fn availability_zone(index: usize) -> Value {
    select(index, json!({ "Fn::GetAZs": "" }))
}

/// The `index`-th block of `count` equal blocks carved from `block`
pub fn cidr(block: Value, count: u32, host_bits: u8, index: usize) -> Value {
    select(index, json!({ "Fn::Cidr": [block, count, host_bits] }))
}
