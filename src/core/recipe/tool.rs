//! The `set_recipe` tool-call contract.
//!
//! Both upstream AI services signal a recipe mutation the same way: a
//! structured tool call named `set_recipe` whose arguments carry the complete
//! replacement recipe. The arguments are validated here before anything is
//! relayed or stored; a call missing a required field is rejected outright
//! rather than producing a partial snapshot.

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use super::{Ingredient, RecipeSnapshot, Step};

/// Tool name the model uses to replace the recipe document.
pub const SET_RECIPE_TOOL: &str = "set_recipe";

/// Reasons a tool call is dropped instead of relayed.
#[derive(Debug, Error)]
pub enum ToolCallError {
    /// The model invoked a tool this bridge does not know
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments were not valid JSON or were missing a required field
    #[error("malformed set_recipe arguments: {0}")]
    MalformedArguments(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct SetRecipeArgs {
    title: String,
    ingredients: Vec<String>,
    steps: Vec<String>,
    #[serde(default)]
    servings: Option<u32>,
}

/// A validated `set_recipe` payload, not yet bound to a recipe id or version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDraft {
    pub title: String,
    pub servings: Option<u32>,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
}

impl RecipeDraft {
    /// Bind the draft to a recipe id and version stamp, producing the full
    /// replacement snapshot. Step strings become `Step N` headings.
    pub fn into_snapshot(self, id: String, last_updated: u64) -> RecipeSnapshot {
        RecipeSnapshot {
            id,
            title: self.title,
            servings: self.servings,
            ingredients: self
                .ingredients
                .into_iter()
                .map(|text| Ingredient { text })
                .collect(),
            steps: self
                .steps
                .into_iter()
                .enumerate()
                .map(|(i, description)| Step {
                    title: format!("Step {}", i + 1),
                    description,
                })
                .collect(),
            last_updated,
        }
    }
}

/// Validate a tool call from either upstream service.
///
/// `arguments` is the raw JSON argument string as the model produced it.
/// Missing required fields (`title`, `ingredients`, `steps`) surface as
/// [`ToolCallError::MalformedArguments`].
pub fn parse_set_recipe(name: &str, arguments: &str) -> Result<RecipeDraft, ToolCallError> {
    if name != SET_RECIPE_TOOL {
        return Err(ToolCallError::UnknownTool(name.to_string()));
    }
    let args: SetRecipeArgs = serde_json::from_str(arguments)?;
    Ok(RecipeDraft {
        title: args.title,
        servings: args.servings,
        ingredients: args.ingredients,
        steps: args.steps,
    })
}

/// JSON schema for the `set_recipe` parameters, advertised to both upstream
/// services so their tool calls arrive in the shape [`parse_set_recipe`]
/// expects.
pub fn set_recipe_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": {
                "type": "string",
                "description": "Recipe title"
            },
            "servings": {
                "type": "integer",
                "description": "Number of servings"
            },
            "ingredients": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Complete ingredient list, one entry per line"
            },
            "steps": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Complete preparation steps, in order"
            }
        },
        "required": ["title", "ingredients", "steps"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_call() {
        let draft = parse_set_recipe(
            SET_RECIPE_TOOL,
            r#"{"title":"Spicy Pasta","ingredients":["pasta","chili"],"steps":["boil","toss"],"servings":4}"#,
        )
        .expect("valid call");

        assert_eq!(draft.title, "Spicy Pasta");
        assert_eq!(draft.servings, Some(4));
        assert_eq!(draft.ingredients, vec!["pasta", "chili"]);
        assert_eq!(draft.steps, vec!["boil", "toss"]);
    }

    #[test]
    fn test_servings_is_optional() {
        let draft = parse_set_recipe(
            SET_RECIPE_TOOL,
            r#"{"title":"Toast","ingredients":["bread"],"steps":["toast it"]}"#,
        )
        .expect("valid call");
        assert_eq!(draft.servings, None);
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let result = parse_set_recipe(
            SET_RECIPE_TOOL,
            r#"{"title":"Toast","ingredients":["bread"]}"#,
        );
        assert!(matches!(result, Err(ToolCallError::MalformedArguments(_))));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let result = parse_set_recipe(SET_RECIPE_TOOL, "{not json");
        assert!(matches!(result, Err(ToolCallError::MalformedArguments(_))));
    }

    #[test]
    fn test_unknown_tool_is_rejected() {
        let result = parse_set_recipe("order_groceries", "{}");
        assert!(matches!(result, Err(ToolCallError::UnknownTool(_))));
    }

    #[test]
    fn test_into_snapshot_numbers_steps() {
        let draft = RecipeDraft {
            title: "Spicy Pasta".to_string(),
            servings: None,
            ingredients: vec!["pasta".to_string()],
            steps: vec!["boil".to_string(), "toss".to_string()],
        };

        let snap = draft.into_snapshot("r1".to_string(), 7);
        assert_eq!(snap.last_updated, 7);
        assert_eq!(snap.steps[0].title, "Step 1");
        assert_eq!(snap.steps[0].description, "boil");
        assert_eq!(snap.steps[1].title, "Step 2");
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = set_recipe_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .expect("required array")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required, vec!["title", "ingredients", "steps"]);
    }
}
