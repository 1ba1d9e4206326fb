//! Translation of OpenAI-style tool lists into Gemini function declarations.
//!
//! Input looks like `[{"type": "function", "function": {"name": ..., "description": ..., "parameters": {...}}}]`,
//! usually JSON-encoded as a string. Entries that are not functions, or whose
//! `function` has no `name`, are skipped.

use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;
use crate::providers::gemini::FunctionDeclaration;

#[derive(Debug, Deserialize)]
struct ToolEntry {
    #[serde(rename = "type")]
    kind: Option<String>,
    function: Option<FunctionSpec>,
}

#[derive(Debug, Deserialize)]
struct FunctionSpec {
    name: Option<String>,
    description: Option<String>,
    parameters: Option<Value>,
}

/// Parse the `tools` field (a JSON string or an inline array) into
/// declarations. Fails with `InvalidToolsJson` if it is not a JSON array and
/// with `NoValidTools` if no entry survives.
pub fn translate_tools(tools: &Value) -> Result<Vec<FunctionDeclaration>, Error> {
    let entries: Vec<Value> = match tools {
        Value::String(encoded) => {
            serde_json::from_str(encoded).map_err(|_| Error::InvalidToolsJson)?
        }
        Value::Array(entries) => entries.clone(),
        _ => return Err(Error::InvalidToolsJson),
    };

    let declarations: Vec<FunctionDeclaration> = entries
        .into_iter()
        .filter_map(declaration_from)
        .collect();

    if declarations.is_empty() {
        return Err(Error::NoValidTools);
    }

    tracing::debug!(count = declarations.len(), "Translated tool declarations");
    Ok(declarations)
}

fn declaration_from(entry: Value) -> Option<FunctionDeclaration> {
    let entry: ToolEntry = serde_json::from_value(entry).ok()?;
    if entry.kind.as_deref() != Some("function") {
        return None;
    }
    let function = entry.function?;
    let name = function.name.filter(|n| !n.is_empty())?;

    Some(FunctionDeclaration {
        name,
        description: function.description.unwrap_or_default(),
        parameters: function.parameters.filter(|p| !p.is_null()),
    })
}
