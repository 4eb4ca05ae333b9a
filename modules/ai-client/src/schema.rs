use anyhow::{anyhow, Result};
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::traits::{ChatAgent, CompletionRequest};
use crate::util::strip_code_blocks;

/// A type a model can be asked to produce as JSON.
///
/// Blanket-implemented for anything that is `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Self-contained schema in the strict dialect structured-output APIs
    /// accept: every object closed (`additionalProperties: false`), every
    /// property required (optional ones stay nullable), no `$ref`.
    fn strict_schema() -> Value {
        let mut schema = serde_json::to_value(schema_for!(Self)).unwrap_or_default();

        let definitions = schema
            .as_object_mut()
            .and_then(|root| {
                root.remove("$schema");
                root.remove("definitions")
            })
            .unwrap_or(Value::Null);

        resolve_refs(&mut schema, &definitions);
        close_objects(&mut schema);
        schema
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Type-safe structured extraction over any provider.
pub async fn extract<T: StructuredOutput>(
    agent: &dyn ChatAgent,
    system_prompt: impl Into<String>,
    user_prompt: impl Into<String>,
) -> Result<T> {
    let request = CompletionRequest::new()
        .system(system_prompt)
        .user(user_prompt)
        .temperature(0.0)
        .json_schema(T::strict_schema());

    let completion = agent.complete(request).await?;

    serde_json::from_str(strip_code_blocks(&completion.text)).map_err(|e| {
        anyhow!(
            "{} reply did not match {}: {}",
            agent.provider(),
            T::type_name(),
            e
        )
    })
}

/// Replace `{"$ref": "#/definitions/X"}` with X, and unwrap the
/// single-element `allOf` schemars emits around referenced fields.
fn resolve_refs(value: &mut Value, definitions: &Value) {
    let replacement = match value {
        Value::Object(map) => {
            let by_ref = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name));
            let by_all_of = match map.get("allOf").and_then(Value::as_array) {
                Some(items) if items.len() == 1 => items.first(),
                _ => None,
            };
            by_ref.or(by_all_of).cloned()
        }
        _ => None,
    };

    if let Some(inner) = replacement {
        *value = inner;
        return resolve_refs(value, definitions);
    }

    match value {
        Value::Object(map) => map.values_mut().for_each(|v| resolve_refs(v, definitions)),
        Value::Array(items) => items.iter_mut().for_each(|v| resolve_refs(v, definitions)),
        _ => {}
    }
}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("object") {
                close_object(map);
            }
            map.values_mut().for_each(close_objects);
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

fn close_object(map: &mut Map<String, Value>) {
    map.insert("additionalProperties".into(), Value::Bool(false));
    let required: Option<Vec<Value>> = map
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().map(Value::String).collect());
    if let Some(required) = required {
        map.insert("required".into(), Value::Array(required));
    }
}
