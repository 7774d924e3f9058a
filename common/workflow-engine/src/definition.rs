//! Workflow definitions
//!
//! A [`Workflow`] is the stored, immutable description of one agent-facing
//! tool: an input schema plus an ordered list of [`Step`]s. Steps are a closed
//! set of kinds; anything malformed is rejected while the definition loads,
//! so the interpreter never sees a step with a missing field.
//!
//! Definitions are stored as JSON with camelCase keys. TOML files with
//! snake_case keys are accepted as well.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{WorkflowError, WorkflowResult};

/// A workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWorkflow", into = "RawWorkflow")]
pub struct Workflow {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Schema the invocation inputs are checked against
    pub input_schema: InputSchema,

    /// Steps to execute, in order
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Create an empty workflow
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: InputSchema::default(),
            steps: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Set the input schema
    pub fn with_input_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = schema;
        self
    }

    /// Add a step
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Parse and validate a definition from a JSON value
    pub fn from_value(value: Value) -> WorkflowResult<Self> {
        let raw: RawWorkflow =
            serde_json::from_value(value).map_err(|e| WorkflowError::Parse(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Parse and validate a definition from a JSON string
    pub fn from_json(json: &str) -> WorkflowResult<Self> {
        let raw: RawWorkflow =
            serde_json::from_str(json).map_err(|e| WorkflowError::Parse(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Parse and validate a definition from a TOML string
    pub fn from_toml(toml_str: &str) -> WorkflowResult<Self> {
        let raw: RawWorkflow =
            toml::from_str(toml_str).map_err(|e| WorkflowError::Parse(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Load a definition from a `.json` or `.toml` file
    pub fn from_file(path: &Path) -> WorkflowResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| WorkflowError::Io(e.to_string()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_json(&content),
        }
    }
}

/// Minimal JSON-Schema-like description of the invocation inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,

    #[serde(default)]
    pub required: Vec<String>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property with a type
    pub fn property(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.properties.insert(
            name.into(),
            PropertySchema {
                kind: Some(kind.into()),
                description: None,
            },
        );
        self
    }

    /// Mark a property as required
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }
}

/// One declared input property
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A step in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct Step {
    /// Name used in logs and step results
    pub name: String,

    /// What the step does
    pub action: StepAction,
}

/// The kind-specific part of a step
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Append an interpolated message to the logs
    Log { message: String },

    /// Bind an interpolated value to a variable
    SetVariable { variable_name: String, value: Value },

    /// Run one of two nested step lists
    Conditional {
        condition: String,
        then_steps: Vec<Step>,
        else_steps: Vec<Step>,
    },

    /// Invoke an external tool
    CallTool {
        tool_name: String,
        parameters: Value,
        result_variable: Option<String>,
    },

    /// Halt with a value
    Return { value: Value },

    /// Pause and hand entity creation to the agent
    CreateObject {
        template_id: String,
        properties: Vec<(String, PropertyMapping)>,
        result_variable: Option<String>,
    },
}

impl StepAction {
    /// The `type` tag of this step
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::Log { .. } => "log",
            StepAction::SetVariable { .. } => "set_variable",
            StepAction::Conditional { .. } => "conditional",
            StepAction::CallTool { .. } => "call_tool",
            StepAction::Return { .. } => "return",
            StepAction::CreateObject { .. } => "create_object",
        }
    }
}

/// How a `create_object` property gets its value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyMapping {
    /// The agent supplies the value (`true` in the definition)
    Agent,

    /// Filled now by interpolating a template such as `{{input.title}}`
    Template(String),
}

impl Step {
    fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }

    pub fn log(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            name,
            StepAction::Log {
                message: message.into(),
            },
        )
    }

    pub fn set_variable(
        name: impl Into<String>,
        variable_name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::new(
            name,
            StepAction::SetVariable {
                variable_name: variable_name.into(),
                value: value.into(),
            },
        )
    }

    pub fn conditional(
        name: impl Into<String>,
        condition: impl Into<String>,
        then_steps: Vec<Step>,
        else_steps: Vec<Step>,
    ) -> Self {
        Self::new(
            name,
            StepAction::Conditional {
                condition: condition.into(),
                then_steps,
                else_steps,
            },
        )
    }

    pub fn call_tool(
        name: impl Into<String>,
        tool_name: impl Into<String>,
        parameters: Value,
        result_variable: Option<&str>,
    ) -> Self {
        Self::new(
            name,
            StepAction::CallTool {
                tool_name: tool_name.into(),
                parameters,
                result_variable: result_variable.map(str::to_string),
            },
        )
    }

    pub fn returning(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(
            name,
            StepAction::Return {
                value: value.into(),
            },
        )
    }

    pub fn create_object(
        name: impl Into<String>,
        template_id: impl Into<String>,
        properties: Vec<(&str, PropertyMapping)>,
        result_variable: Option<&str>,
    ) -> Self {
        Self::new(
            name,
            StepAction::CreateObject {
                template_id: template_id.into(),
                properties: properties
                    .into_iter()
                    .map(|(key, mapping)| (key.to_string(), mapping))
                    .collect(),
                result_variable: result_variable.map(str::to_string),
            },
        )
    }

    /// Number of steps including every nested one
    pub fn count(&self) -> usize {
        match &self.action {
            StepAction::Conditional {
                then_steps,
                else_steps,
                ..
            } => 1 + then_steps.iter().chain(else_steps).map(Step::count).sum::<usize>(),
            _ => 1,
        }
    }
}

// ============================================================================
// Wire representation
// ============================================================================

/// Workflow as stored, before step validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWorkflow {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, alias = "input_schema")]
    pub input_schema: InputSchema,

    #[serde(default)]
    pub steps: Vec<RawStep>,
}

/// Step as stored: a name, a type tag and loosely typed fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStep {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TryFrom<RawWorkflow> for Workflow {
    type Error = WorkflowError;

    fn try_from(raw: RawWorkflow) -> Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err(WorkflowError::Parse("workflow name is required".into()));
        }
        let steps = raw
            .steps
            .into_iter()
            .map(Step::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: raw.name,
            description: raw.description,
            input_schema: raw.input_schema,
            steps,
        })
    }
}

impl From<Workflow> for RawWorkflow {
    fn from(workflow: Workflow) -> Self {
        Self {
            name: workflow.name,
            description: workflow.description,
            input_schema: workflow.input_schema,
            steps: workflow.steps.into_iter().map(RawStep::from).collect(),
        }
    }
}

/// First present field among the accepted spellings
fn field<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| fields.get(*name))
}

fn required_string(fields: &Map<String, Value>, step: &str, names: &[&str]) -> WorkflowResult<String> {
    match field(fields, names) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(WorkflowError::definition(
            step,
            format!("field '{}' must not be empty", names[0]),
        )),
        Some(other) => Err(WorkflowError::definition(
            step,
            format!("field '{}' must be a string, got {}", names[0], other),
        )),
        None => Err(WorkflowError::definition(
            step,
            format!("missing required field '{}'", names[0]),
        )),
    }
}

fn optional_string(
    fields: &Map<String, Value>,
    step: &str,
    names: &[&str],
) -> WorkflowResult<Option<String>> {
    match field(fields, names) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(WorkflowError::definition(
            step,
            format!("field '{}' must be a string, got {}", names[0], other),
        )),
    }
}

fn nested_steps(fields: &Map<String, Value>, step: &str, name: &str) -> WorkflowResult<Vec<Step>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => {
            let raw: Vec<RawStep> = serde_json::from_value(value.clone()).map_err(|e| {
                WorkflowError::definition(step, format!("field '{}' must be a step list: {}", name, e))
            })?;
            raw.into_iter().map(Step::try_from).collect()
        }
    }
}

fn property_mappings(
    fields: &Map<String, Value>,
    step: &str,
) -> WorkflowResult<Vec<(String, PropertyMapping)>> {
    let map = match fields.get("properties") {
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(WorkflowError::definition(
                step,
                format!("field 'properties' must be an object, got {}", other),
            ))
        }
        None => {
            return Err(WorkflowError::definition(
                step,
                "missing required field 'properties'",
            ))
        }
    };

    let mut mappings = Vec::with_capacity(map.len());
    for (key, value) in map {
        match value {
            Value::Bool(true) => mappings.push((key.clone(), PropertyMapping::Agent)),
            Value::Bool(false) | Value::Null => {}
            Value::String(template) => {
                mappings.push((key.clone(), PropertyMapping::Template(template.clone())))
            }
            other => {
                return Err(WorkflowError::definition(
                    step,
                    format!(
                        "property '{}' must be true or a template string, got {}",
                        key, other
                    ),
                ))
            }
        }
    }
    Ok(mappings)
}

impl TryFrom<RawStep> for Step {
    type Error = WorkflowError;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return Err(WorkflowError::definition(
                &format!("<{}>", raw.kind),
                "step name is required",
            ));
        }
        let fields = &raw.fields;

        let action = match raw.kind.as_str() {
            "log" => StepAction::Log {
                message: required_string(fields, &name, &["message"])?,
            },
            "set_variable" => StepAction::SetVariable {
                variable_name: required_string(fields, &name, &["variableName", "variable_name"])?,
                value: fields
                    .get("value")
                    .cloned()
                    .ok_or_else(|| WorkflowError::definition(&name, "missing required field 'value'"))?,
            },
            "conditional" => StepAction::Conditional {
                condition: required_string(fields, &name, &["condition"])?,
                then_steps: nested_steps(fields, &name, "then")?,
                else_steps: nested_steps(fields, &name, "else")?,
            },
            "call_tool" => StepAction::CallTool {
                tool_name: required_string(fields, &name, &["toolName", "tool_name"])?,
                parameters: fields.get("parameters").cloned().ok_or_else(|| {
                    WorkflowError::definition(&name, "missing required field 'parameters'")
                })?,
                result_variable: optional_string(fields, &name, &["resultVariable", "result_variable"])?,
            },
            "return" => StepAction::Return {
                value: fields.get("value").cloned().unwrap_or(Value::Null),
            },
            "create_object" => StepAction::CreateObject {
                template_id: required_string(fields, &name, &["templateId", "template_id"])?,
                properties: property_mappings(fields, &name)?,
                result_variable: optional_string(fields, &name, &["resultVariable", "result_variable"])?,
            },
            "" => {
                return Err(WorkflowError::definition(
                    &name,
                    "missing required field 'type'",
                ))
            }
            other => {
                return Err(WorkflowError::UnknownStepType {
                    step: name,
                    kind: other.to_string(),
                })
            }
        };

        Ok(Step { name, action })
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        let kind = step.action.kind().to_string();
        let mut fields = Map::new();
        match step.action {
            StepAction::Log { message } => {
                fields.insert("message".into(), Value::String(message));
            }
            StepAction::SetVariable {
                variable_name,
                value,
            } => {
                fields.insert("variableName".into(), Value::String(variable_name));
                fields.insert("value".into(), value);
            }
            StepAction::Conditional {
                condition,
                then_steps,
                else_steps,
            } => {
                fields.insert("condition".into(), Value::String(condition));
                fields.insert("then".into(), steps_to_value(then_steps));
                fields.insert("else".into(), steps_to_value(else_steps));
            }
            StepAction::CallTool {
                tool_name,
                parameters,
                result_variable,
            } => {
                fields.insert("toolName".into(), Value::String(tool_name));
                fields.insert("parameters".into(), parameters);
                if let Some(var) = result_variable {
                    fields.insert("resultVariable".into(), Value::String(var));
                }
            }
            StepAction::Return { value } => {
                fields.insert("value".into(), value);
            }
            StepAction::CreateObject {
                template_id,
                properties,
                result_variable,
            } => {
                fields.insert("templateId".into(), Value::String(template_id));
                let props = properties
                    .into_iter()
                    .map(|(key, mapping)| {
                        let value = match mapping {
                            PropertyMapping::Agent => Value::Bool(true),
                            PropertyMapping::Template(template) => Value::String(template),
                        };
                        (key, value)
                    })
                    .collect();
                fields.insert("properties".into(), Value::Object(props));
                if let Some(var) = result_variable {
                    fields.insert("resultVariable".into(), Value::String(var));
                }
            }
        }

        RawStep {
            name: step.name,
            kind,
            fields,
        }
    }
}

impl From<RawStep> for Value {
    fn from(raw: RawStep) -> Self {
        let mut object = Map::with_capacity(raw.fields.len() + 2);
        object.insert("name".into(), Value::String(raw.name));
        object.insert("type".into(), Value::String(raw.kind));
        object.extend(raw.fields);
        Value::Object(object)
    }
}

fn steps_to_value(steps: Vec<Step>) -> Value {
    Value::Array(
        steps
            .into_iter()
            .map(|step| Value::from(RawStep::from(step)))
            .collect(),
    )
}
