//! Pipeline definition types.
//!
//! These types represent the user-authored pipeline YAML configuration.
//! They are parsed once at run start and never mutated afterwards.

use crate::error::{Error, Result};
use crate::trigger::EventKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineSpec {
    pub name: String,
    /// Top-level trigger filter. Empty means the pipeline runs for any event.
    #[serde(default)]
    pub when: Vec<WhenClause>,
    #[serde(default)]
    pub matrix: Option<MatrixSpec>,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub publish: Option<PublishSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatrixSpec {
    /// Declared axes, in order. The first axis varies slowest during expansion.
    #[serde(default)]
    pub axes: Vec<MatrixAxis>,
    /// Explicit extra legs appended after the cross product.
    #[serde(default)]
    pub include: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatrixAxis {
    pub name: String,
    pub values: Vec<String>,
}

/// One concrete assignment of matrix axis variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Leg {
    pub index: usize,
    pub bindings: BTreeMap<String, String>,
}

impl Leg {
    pub fn new(index: usize, bindings: BTreeMap<String, String>) -> Self {
        Self { index, bindings }
    }

    pub fn get(&self, axis: &str) -> Option<&str> {
        self.bindings.get(axis).map(String::as_str)
    }

    /// Human-readable name, e.g. `ARCH=amd64, OS=linux`, or `default` for
    /// the implicit empty leg.
    pub fn display_name(&self) -> String {
        if self.bindings.is_empty() {
            return "default".to_string();
        }
        self.bindings
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepSpec {
    /// Unique within the pipeline.
    pub name: String,
    /// Image reference for the sandbox this step runs in.
    pub image: String,
    pub commands: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, EnvValue>,
    /// Disjunction of clauses; empty means the step always runs.
    #[serde(default)]
    pub when: Vec<WhenClause>,
    /// Diagnostic commands attempted when the leg fails, even on the
    /// failure path, before the leg reports.
    #[serde(default)]
    pub on_failure: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// An environment entry: either a literal value or a reference to a
/// named secret resolved at execution time.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum EnvValue {
    Secret(SecretReference),
    Literal(String),
}

/// Opaque secret name. The resolved value never appears in the spec,
/// in execution records, or in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SecretReference {
    pub from_secret: String,
}

/// A conjunction of sub-predicates. A step's clause list matches if at
/// least one clause matches (OR of ANDs).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WhenClause {
    #[serde(default)]
    pub event: Vec<EventKind>,
    /// Branch glob patterns.
    #[serde(default)]
    pub branch: Vec<String>,
    /// Tag glob patterns.
    #[serde(default)]
    pub tag: Vec<String>,
    /// Partial leg matcher: every named axis must equal the leg's value.
    #[serde(default)]
    pub matrix: BTreeMap<String, String>,
    /// When set, requires the run to be (or not be) cron-triggered.
    #[serde(default)]
    pub cron: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PublishSpec {
    #[serde(default)]
    pub object: Option<ObjectTarget>,
    #[serde(default)]
    pub image: Option<ImageTarget>,
}

/// Object-storage target. `key` is a template substituted per leg,
/// e.g. `${ARCH}/${REF_TAG}/server`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObjectTarget {
    pub key: String,
    /// Workspace-relative path of the file to push.
    pub source: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

/// Container-registry target. `tag` is a template substituted per leg.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageTarget {
    pub repository: String,
    pub tag: String,
    /// Local image reference to push; may itself be a template.
    pub image: String,
}

impl PipelineSpec {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let spec: PipelineSpec =
            serde_yaml::from_str(content).map_err(|e| Error::Spec(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the spec before any execution.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(Error::Spec(format!("duplicate step name: {}", step.name)));
            }
            if step.commands.is_empty() {
                return Err(Error::Spec(format!(
                    "step {} has no commands",
                    step.name
                )));
            }
        }

        if let Some(matrix) = &self.matrix {
            matrix.validate()?;
        }

        Ok(())
    }

    /// The fixed axis-name set for the whole pipeline.
    pub fn axis_names(&self) -> BTreeSet<String> {
        match &self.matrix {
            Some(matrix) => matrix.axis_names(),
            None => BTreeSet::new(),
        }
    }
}

/// JSON Schema for the pipeline file, for editor validation and docs.
pub fn schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(PipelineSpec)
}

impl MatrixSpec {
    pub fn axis_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> =
            self.axes.iter().map(|a| a.name.clone()).collect();
        if names.is_empty() {
            // With no declared axes the first include leg fixes the set.
            if let Some(first) = self.include.first() {
                names = first.keys().cloned().collect();
            }
        }
        names
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for axis in &self.axes {
            if !seen.insert(axis.name.as_str()) {
                return Err(Error::Spec(format!(
                    "duplicate matrix axis: {}",
                    axis.name
                )));
            }
            if axis.values.is_empty() {
                return Err(Error::Spec(format!(
                    "matrix axis {} has no values",
                    axis.name
                )));
            }
        }

        let names = self.axis_names();
        for (i, leg) in self.include.iter().enumerate() {
            let leg_names: BTreeSet<String> = leg.keys().cloned().collect();
            if leg_names != names {
                return Err(Error::Spec(format!(
                    "include leg {} does not match the declared axis set {:?}",
                    i, names
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minimal_pipeline() {
        let yaml = r#"
name: build
steps:
  - name: build
    image: rust:1.82
    commands:
      - cargo build --release
"#;
        let spec = PipelineSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "build");
        assert_eq!(spec.steps.len(), 1);
        assert!(spec.matrix.is_none());
        assert!(spec.steps[0].when.is_empty());
    }

    #[test]
    fn test_parse_environment_with_secret() {
        let yaml = r#"
name: publish
steps:
  - name: push
    image: alpine:3
    commands: ["./push.sh"]
    environment:
      TARGET: releases
      REGISTRY_TOKEN:
        from_secret: registry_token
"#;
        let spec = PipelineSpec::from_yaml(yaml).unwrap();
        let env = &spec.steps[0].environment;
        assert!(matches!(env["TARGET"], EnvValue::Literal(ref v) if v == "releases"));
        assert!(
            matches!(env["REGISTRY_TOKEN"], EnvValue::Secret(ref r) if r.from_secret == "registry_token")
        );
    }

    #[test]
    fn test_parse_when_clauses() {
        let yaml = r#"
name: conditional
steps:
  - name: integration
    image: alpine:3
    commands: ["./it.sh"]
    when:
      - event: [push]
        matrix:
          ARCH: amd64
      - event: [cron]
"#;
        let spec = PipelineSpec::from_yaml(yaml).unwrap();
        let when = &spec.steps[0].when;
        assert_eq!(when.len(), 2);
        assert_eq!(when[0].event, vec![EventKind::Push]);
        assert_eq!(when[0].matrix["ARCH"], "amd64");
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let yaml = r#"
name: dup
steps:
  - name: build
    image: alpine:3
    commands: ["true"]
  - name: build
    image: alpine:3
    commands: ["true"]
"#;
        let err = PipelineSpec::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Spec(_)));
    }

    #[test]
    fn test_empty_axis_rejected() {
        let yaml = r#"
name: bad-matrix
matrix:
  axes:
    - name: ARCH
      values: []
steps:
  - name: build
    image: alpine:3
    commands: ["true"]
"#;
        let err = PipelineSpec::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Spec(_)));
    }

    #[test]
    fn test_include_leg_axis_mismatch_rejected() {
        let yaml = r#"
name: bad-include
matrix:
  axes:
    - name: ARCH
      values: [amd64]
  include:
    - OS: linux
steps:
  - name: build
    image: alpine:3
    commands: ["true"]
"#;
        let err = PipelineSpec::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Spec(_)));
    }

    #[test]
    fn test_schema_describes_the_pipeline_file() {
        let schema = serde_json::to_value(schema()).unwrap();
        assert_eq!(schema["title"], "PipelineSpec");
        assert!(schema["properties"].get("steps").is_some());
        assert!(schema["properties"].get("matrix").is_some());
        assert!(schema["properties"].get("publish").is_some());
    }

    #[test]
    fn test_leg_display_name() {
        let mut bindings = BTreeMap::new();
        bindings.insert("ARCH".to_string(), "amd64".to_string());
        bindings.insert("OS".to_string(), "linux".to_string());
        let leg = Leg::new(0, bindings);
        assert_eq!(leg.display_name(), "ARCH=amd64, OS=linux");

        let empty = Leg::new(0, BTreeMap::new());
        assert_eq!(empty.display_name(), "default");
    }
}
