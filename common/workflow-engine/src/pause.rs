//! Pause payload for `create_object`
//!
//! Creating an entity needs free-text values only the agent can supply, and
//! the insert itself happens outside the engine. The step therefore resolves
//! what it can from the inputs, describes the rest, and halts the run with
//! the resulting payload.

use serde_json::Map;

use crate::context::{PausePayload, PropertyField};
use crate::definition::PropertyMapping;
use crate::error::{WorkflowError, WorkflowResult};
use crate::providers::TemplateSchema;
use crate::template::Scope;

/// Action name carried by create-object pauses
pub const CREATE_OBJECT_ACTION: &str = "create_object";

/// Build the payload for a `create_object` step
pub fn create_object_payload(
    template: &TemplateSchema,
    mappings: &[(String, PropertyMapping)],
    scope: &Scope<'_>,
) -> WorkflowResult<PausePayload> {
    if let Some((key, _)) = mappings
        .iter()
        .find(|(key, _)| !template.properties.iter().any(|p| &p.key == key))
    {
        return Err(WorkflowError::UnknownTemplateProperty {
            template: template.id.clone(),
            property: key.clone(),
        });
    }

    let mut property_schemas = Vec::new();
    let mut property_values = Map::new();

    for property in &template.properties {
        let Some((_, mapping)) = mappings.iter().find(|(key, _)| key == &property.key) else {
            continue;
        };
        match mapping {
            PropertyMapping::Template(expression) => {
                property_values.insert(property.key.clone(), scope.interpolate_str(expression));
            }
            PropertyMapping::Agent => property_schemas.push(PropertyField {
                key: property.key.clone(),
                kind: property.kind,
                description: property.description.clone(),
            }),
        }
    }

    let instruction = instruction(&template.name, &property_schemas, &property_values);

    Ok(PausePayload {
        action: CREATE_OBJECT_ACTION.to_string(),
        template_id: template.id.clone(),
        template_name: template.name.clone(),
        property_schemas,
        property_values,
        instruction,
    })
}

fn instruction(
    template_name: &str,
    agent_fields: &[PropertyField],
    provided: &Map<String, serde_json::Value>,
) -> String {
    let mut text = format!("Create a new {} object.", template_name);

    if agent_fields.is_empty() {
        text.push_str(" No further values are needed from you.");
    } else {
        let fields = agent_fields
            .iter()
            .map(|field| {
                if field.description.is_empty() {
                    format!("{} ({})", field.key, field.kind.as_str())
                } else {
                    format!("{} ({}): {}", field.key, field.kind.as_str(), field.description)
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        text.push_str(&format!(" Provide values for: {}.", fields));
    }

    if !provided.is_empty() {
        let keys = provided.keys().cloned().collect::<Vec<_>>().join(", ");
        text.push_str(&format!(
            " Already provided (use as given in property_values): {}.",
            keys
        ));
    }

    text
}
