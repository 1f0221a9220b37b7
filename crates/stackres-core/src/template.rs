//! Stack templates: a `Resources` mapping of `{Type, Properties, Metadata,
//! DependsOn}` entries, accepted as JSON or YAML, in either the CamelCase or
//! the lowercase key style.

use crate::dependency::DependencyGraph;
use crate::error::{Result, StackError};
use crate::paths;
use crate::registry;
use serde_json::Value;
use serde_yaml::{Mapping, Value as YamlValue};

#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    pub name: String,
    pub resource_type: String,
    pub description: Option<String>,
    pub properties: Value,
    pub metadata: Value,
    /// Explicit `DependsOn` entries only; references are found by
    /// [`references`].
    pub depends_on: Vec<String>,
}

impl ResourceDefinition {
    /// Properties searched for references. An inline nested template refers
    /// to its own resources, not to ours.
    fn scanned_properties(&self) -> Value {
        let mut props = self.properties.clone();
        if registry::is_type(&self.resource_type, registry::NESTED_STACK) {
            if let Some(obj) = props.as_object_mut() {
                obj.remove("Template");
                obj.remove("template");
            }
        }
        props
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    pub description: Option<String>,
    pub parameters: Vec<String>,
    pub resources: Vec<ResourceDefinition>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let doc: YamlValue = serde_yaml::from_str(source)
            .map_err(|e| StackError::InvalidTemplate(e.to_string()))?;
        Self::from_yaml(&doc)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let doc = serde_yaml::to_value(value)?;
        Self::from_yaml(&doc)
    }

    fn from_yaml(doc: &YamlValue) -> Result<Self> {
        let top = doc
            .as_mapping()
            .ok_or_else(|| StackError::InvalidTemplate("template must be a mapping".into()))?;

        let description = section(top, &["Description", "description"])
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let parameters = section(top, &["Parameters", "parameters"])
            .and_then(|v| v.as_mapping())
            .map(|m| m.keys().filter_map(|k| k.as_str()).map(str::to_string).collect())
            .unwrap_or_default();

        let mut resources = Vec::new();
        if let Some(res) = section(top, &["Resources", "resources"]) {
            let res = res.as_mapping().ok_or_else(|| {
                StackError::InvalidTemplate("Resources must be a mapping".into())
            })?;
            for (key, body) in res {
                let name = key.as_str().ok_or_else(|| {
                    StackError::InvalidTemplate("resource names must be strings".into())
                })?;
                resources.push(parse_resource(name, body)?);
            }
        }

        let tmpl = Self {
            description,
            parameters,
            resources,
        };
        tmpl.dependency_graph()?.order()?;
        Ok(tmpl)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceDefinition> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Graph of explicit `DependsOn` edges plus every resource reference in
    /// properties and metadata. References to parameters and pseudo
    /// parameters (`AWS::StackName`) are not edges.
    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for r in &self.resources {
            graph.add_node(&r.name);
        }
        for r in &self.resources {
            let mut targets = r.depends_on.clone();
            let mut refs = Vec::new();
            references(&r.scanned_properties(), &mut refs);
            references(&r.metadata, &mut refs);
            for target in refs {
                if target.contains("::") || self.parameters.contains(&target) {
                    continue;
                }
                if self.resource(&target).is_none() {
                    return Err(StackError::InvalidTemplate(format!(
                        "resource '{}' references unknown resource '{target}'",
                        r.name
                    )));
                }
                targets.push(target);
            }
            for target in targets {
                if target == r.name {
                    return Err(StackError::CircularDependency(target));
                }
                graph.add_dependency(&r.name, &target)?;
            }
        }
        Ok(graph)
    }
}

fn section<'a>(map: &'a Mapping, keys: &[&str]) -> Option<&'a YamlValue> {
    keys.iter().find_map(|k| map.get(*k))
}

fn parse_resource(name: &str, body: &YamlValue) -> Result<ResourceDefinition> {
    paths::validate_resource_name(name)?;
    let body = body.as_mapping().ok_or_else(|| {
        StackError::InvalidTemplate(format!("resource '{name}' must be a mapping"))
    })?;

    let resource_type = section(body, &["Type", "type"])
        .and_then(|v| v.as_str())
        .ok_or_else(|| StackError::InvalidTemplate(format!("resource '{name}' has no Type")))?
        .to_string();

    let to_json = |v: Option<&YamlValue>| -> Result<Value> {
        match v {
            None | Some(YamlValue::Null) => Ok(Value::Object(Default::default())),
            Some(v) => serde_json::to_value(v).map_err(|e| {
                StackError::InvalidTemplate(format!("resource '{name}': {e}"))
            }),
        }
    };
    let properties = to_json(section(body, &["Properties", "properties"]))?;
    let metadata = to_json(section(body, &["Metadata", "metadata"]))?;
    if !properties.is_object() || !metadata.is_object() {
        return Err(StackError::InvalidTemplate(format!(
            "resource '{name}': Properties and Metadata must be mappings"
        )));
    }

    let depends_on = match section(body, &["DependsOn", "depends_on"]) {
        None => Vec::new(),
        Some(YamlValue::String(s)) => vec![s.clone()],
        Some(YamlValue::Sequence(seq)) => seq
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    StackError::InvalidTemplate(format!("resource '{name}': bad DependsOn"))
                })
            })
            .collect::<Result<_>>()?,
        Some(_) => {
            return Err(StackError::InvalidTemplate(format!(
                "resource '{name}': DependsOn must be a name or a list"
            )))
        }
    };

    let description = section(body, &["Description", "description"])
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(ResourceDefinition {
        name: name.to_string(),
        resource_type,
        description,
        properties,
        metadata,
        depends_on,
    })
}

/// The resource a single value points at: a bare name, `{"Ref": name}` or
/// `{"get_resource": name}`.
pub fn reference_target(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) if obj.len() == 1 => obj
            .get("Ref")
            .or_else(|| obj.get("get_resource"))
            .and_then(Value::as_str),
        _ => None,
    }
}

/// Collect every resource named by `Ref`, `get_resource`, `Fn::GetAtt` or
/// `get_attr` anywhere inside `value`.
pub fn references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(obj) => {
            for (k, v) in obj {
                match k.as_str() {
                    "Ref" | "get_resource" => {
                        if let Some(s) = v.as_str() {
                            out.push(s.to_string());
                        }
                    }
                    "Fn::GetAtt" | "get_attr" => {
                        if let Some(s) = v.as_array().and_then(|a| a.first()).and_then(Value::as_str)
                        {
                            out.push(s.to_string());
                        }
                    }
                    _ => references(v, out),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                references(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORDPRESS: &str = r#"
{
  "AWSTemplateFormatVersion" : "2010-09-09",
  "Description" : "WordPress",
  "Parameters" : { "KeyName" : { "Type" : "String", "Default" : "test" } },
  "Resources" : {
    "WebServer": {
      "Type": "AWS::EC2::Instance",
      "DependsOn": "DatabaseServer",
      "Properties": {
        "KeyName": { "Ref": "KeyName" },
        "UserData": { "Fn::GetAtt": ["DatabaseServer", "PrivateIp"] }
      }
    },
    "DatabaseServer": {
      "Type": "AWS::EC2::Instance",
      "Properties": { "ImageId": "F17-x86_64-gold" }
    }
  }
}
"#;

    #[test]
    fn parses_json_template_in_declaration_order() {
        let t = Template::parse(WORDPRESS).unwrap();
        assert_eq!(t.description.as_deref(), Some("WordPress"));
        assert_eq!(t.parameters, vec!["KeyName"]);
        let names: Vec<_> = t.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["WebServer", "DatabaseServer"]);
        assert_eq!(t.resources[0].depends_on, vec!["DatabaseServer"]);
    }

    #[test]
    fn parameter_refs_are_not_dependencies() {
        let t = Template::parse(WORDPRESS).unwrap();
        let g = t.dependency_graph().unwrap();
        assert_eq!(g.dependencies("WebServer"), vec!["DatabaseServer"]);
        assert_eq!(g.order().unwrap(), vec!["DatabaseServer", "WebServer"]);
    }

    #[test]
    fn parses_lowercase_yaml() {
        let src = "
description: small
resources:
  handle:
    type: OS::Heat::WaitConditionHandle
  waiter:
    type: AWS::CloudFormation::WaitCondition
    properties:
      Handle: { get_resource: handle }
      Count: 2
";
        let t = Template::parse(src).unwrap();
        let g = t.dependency_graph().unwrap();
        assert_eq!(g.required_by("handle"), vec!["waiter"]);
        assert_eq!(t.resource("waiter").unwrap().properties["Count"], 2);
    }

    #[test]
    fn unknown_reference_is_invalid() {
        let src = r#"{"Resources": {"a": {"Type": "X", "Properties": {"p": {"Ref": "ghost"}}}}}"#;
        assert!(matches!(
            Template::parse(src),
            Err(StackError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn self_reference_is_cycle() {
        let src = r#"{"Resources": {"a": {"Type": "X", "DependsOn": "a"}}}"#;
        assert!(matches!(
            Template::parse(src),
            Err(StackError::CircularDependency(_))
        ));
    }

    #[test]
    fn missing_type_is_invalid() {
        let src = r#"{"Resources": {"a": {"Properties": {}}}}"#;
        assert!(Template::parse(src).is_err());
    }

    #[test]
    fn reference_target_forms() {
        assert_eq!(reference_target(&serde_json::json!("h")), Some("h"));
        assert_eq!(reference_target(&serde_json::json!({"Ref": "h"})), Some("h"));
        assert_eq!(
            reference_target(&serde_json::json!({"get_resource": "h"})),
            Some("h")
        );
        assert_eq!(reference_target(&serde_json::json!(3)), None);
    }
}
