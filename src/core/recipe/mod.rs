//! Shared recipe document model.
//!
//! Both conversation channels (voice WebSocket and streaming chat) mutate the
//! same recipe document. A recipe travels as a [`RecipeSnapshot`]: a complete
//! replacement of the document, never a diff. Writers stamp each snapshot with
//! a millisecond timestamp and consumers apply it only when that stamp is
//! strictly newer than the one they hold, so the two channels can race without
//! coordination.

use serde::{Deserialize, Serialize};

mod store;
mod tool;

pub use store::RecipeStore;
pub use tool::{RecipeDraft, SET_RECIPE_TOOL, ToolCallError, parse_set_recipe, set_recipe_schema};

/// A single ingredient line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Free-form ingredient text, e.g. "200g dried pasta"
    pub text: String,
}

/// A single preparation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Short step heading
    pub title: String,
    /// Full step instructions
    pub description: String,
}

/// A complete, versioned recipe document.
///
/// Snapshots are full replacements: a mutation always carries the whole
/// ingredient and step lists. `last_updated` is the version; see
/// [`RecipeStore::apply_if_newer`] for the replacement rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSnapshot {
    /// Stable recipe identifier shared across both channels
    pub id: String,
    /// Recipe title
    pub title: String,
    /// Number of servings, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    /// Ordered ingredient list
    pub ingredients: Vec<Ingredient>,
    /// Ordered preparation steps
    pub steps: Vec<Step>,
    /// Version stamp in unix milliseconds, strictly increasing per recipe
    pub last_updated: u64,
}

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> u64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    (nanos / 1_000_000).max(0) as u64
}

/// Next version stamp for a recipe whose latest known version is `prev`.
///
/// Wall-clock time normally wins, but two mutations landing inside the same
/// millisecond must still produce strictly increasing stamps, so the result
/// is never less than `prev + 1`.
pub fn next_version(prev: Option<u64>) -> u64 {
    match prev {
        Some(prev) => now_ms().max(prev + 1),
        None => now_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, last_updated: u64) -> RecipeSnapshot {
        RecipeSnapshot {
            id: id.to_string(),
            title: "Spicy Pasta".to_string(),
            servings: Some(2),
            ingredients: vec![Ingredient {
                text: "pasta".to_string(),
            }],
            steps: vec![Step {
                title: "Step 1".to_string(),
                description: "boil".to_string(),
            }],
            last_updated,
        }
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_value(snapshot("r1", 42)).expect("serialize");
        assert_eq!(json["id"], "r1");
        assert_eq!(json["lastUpdated"], 42);
        assert_eq!(json["ingredients"][0]["text"], "pasta");
        assert_eq!(json["steps"][0]["description"], "boil");
    }

    #[test]
    fn test_snapshot_omits_missing_servings() {
        let mut snap = snapshot("r1", 1);
        snap.servings = None;
        let json = serde_json::to_value(snap).expect("serialize");
        assert!(json.get("servings").is_none());
    }

    #[test]
    fn test_next_version_strictly_increases() {
        let now = now_ms();
        let far_future = now + 60_000;
        assert_eq!(next_version(Some(far_future)), far_future + 1);
        assert!(next_version(Some(0)) >= now);
        assert!(next_version(None) >= now);
    }
}
