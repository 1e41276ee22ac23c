use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{ANY_CUISINE, MealRequest, RecommendationEntry, TargetRange, UserProfile};
use crate::period::Period;

pub const SYSTEM_PROMPT: &str = "You are a knowledgeable diabetes nutritional assistant providing \
detailed and personalized dietary recommendations based on glucose levels. Consider the glycemic \
index of foods, portion sizes, and overall balanced nutrition. Provide specific meal ideas and \
explain why they're suitable based on the glucose readings. Include both what to eat and what to \
avoid based on the current readings.";

/// Text-generation collaborator.
///
/// The CLI implements this with an OpenAI-compatible HTTP client. Called
/// synchronously; async hosts should call it off the request thread or use
/// the session's begin/finish pair directly.
pub trait RecommendationProvider: Send + Sync {
    fn generate(&self, payload: &PromptPayload) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Instruction and context handed to the text-generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPayload {
    pub system: String,
    pub user: String,
}

impl PromptPayload {
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::new("system", &self.system),
            ChatMessage::new("user", &self.user),
        ]
    }
}

/// Build the recommendation prompt.
///
/// `latest` holds one reading per classified period; periods missing from it
/// are reported as `default_reading`. Pure: same inputs, same payload.
#[must_use]
pub fn build_prompt(
    profile: &UserProfile,
    target: &TargetRange,
    latest: &BTreeMap<Period, i64>,
    default_reading: i64,
    request: &MealRequest,
) -> PromptPayload {
    let mut user = String::new();

    if let Some(diabetes_type) = profile.diabetes_type {
        let _ = write!(
            user,
            "I have {diabetes_type} diabetes. My target glucose range is {}-{} mg/dL. ",
            target.min, target.max
        );
    }

    user.push_str("\nMy recent glucose readings are:\n");
    for period in Period::CLASSIFIED {
        let value = latest.get(&period).copied().unwrap_or(default_reading);
        let _ = writeln!(user, "- {period}: {value} mg/dL");
    }

    let _ = writeln!(user, "\nI'm planning to eat for {}.", request.meal_type);

    let foods = request.foods.trim();
    let foods = if foods.is_empty() { "anything healthy" } else { foods };
    let _ = writeln!(user, "I'm interested in eating: {foods}");

    let restrictions: Vec<&str> = request
        .restrictions
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect();
    let restrictions = if restrictions.is_empty() {
        "None".to_string()
    } else {
        restrictions.join(", ")
    };
    let _ = writeln!(user, "Dietary restrictions: {restrictions}");

    let cuisine = request.cuisine.trim();
    if !cuisine.is_empty() && cuisine != ANY_CUISINE {
        let _ = writeln!(user, "Cuisine preference: {cuisine}");
    }

    user.push_str(
        "\nPlease provide:\n\
         1. An analysis of my glucose patterns\n\
         2. Specific meal recommendations with portions\n\
         3. Foods to avoid based on my current readings\n\
         4. Tips for maintaining stable glucose after this meal",
    );

    PromptPayload {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Append-only list of generated recommendations; the last one is current.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecommendationLog {
    entries: Vec<RecommendationEntry>,
}

impl RecommendationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        meal_type: &str,
        text: impl Into<String>,
        now: NaiveDateTime,
    ) -> &RecommendationEntry {
        self.entries.push(RecommendationEntry {
            timestamp: now,
            meal_type: meal_type.to_string(),
            text: text.into(),
        });
        &self.entries[self.entries.len() - 1]
    }

    #[must_use]
    pub fn current(&self) -> Option<&RecommendationEntry> {
        self.entries.last()
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn history(&self) -> &[RecommendationEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_READING, DiabetesType};
    use crate::testing::date;

    fn request() -> MealRequest {
        MealRequest {
            meal_type: "Dinner".to_string(),
            foods: String::new(),
            restrictions: Vec::new(),
            cuisine: "Any".to_string(),
        }
    }

    fn readings() -> BTreeMap<Period, i64> {
        BTreeMap::from([(Period::Morning, 110), (Period::Evening, 160)])
    }

    #[test]
    fn test_prompt_defaults() {
        let payload = build_prompt(
            &UserProfile::default(),
            &TargetRange::default(),
            &readings(),
            DEFAULT_READING,
            &request(),
        );
        assert_eq!(payload.system, SYSTEM_PROMPT);
        assert!(payload.user.contains("Dietary restrictions: None"));
        assert!(payload.user.contains("I'm interested in eating: anything healthy"));
        assert!(!payload.user.contains("Cuisine preference"));
        assert!(!payload.user.contains("I have"));
        assert!(payload.user.contains("I'm planning to eat for Dinner."));
    }

    #[test]
    fn test_prompt_substitutes_default_reading() {
        let payload = build_prompt(
            &UserProfile::default(),
            &TargetRange::default(),
            &readings(),
            DEFAULT_READING,
            &request(),
        );
        assert!(payload.user.contains("- Morning: 110 mg/dL"));
        assert!(payload.user.contains("- Afternoon: 120 mg/dL"));
        assert!(payload.user.contains("- Evening: 160 mg/dL"));

        let morning = payload.user.find("- Morning").unwrap();
        let afternoon = payload.user.find("- Afternoon").unwrap();
        let evening = payload.user.find("- Evening").unwrap();
        assert!(morning < afternoon && afternoon < evening);
    }

    #[test]
    fn test_prompt_with_profile_and_preferences() {
        let profile = UserProfile {
            name: "Alex".to_string(),
            diabetes_type: Some(DiabetesType::Type2),
        };
        let target = TargetRange { min: 90, max: 140 };
        let request = MealRequest {
            meal_type: "Lunch".to_string(),
            foods: "  salmon, quinoa ".to_string(),
            restrictions: vec!["Gluten-Free".to_string(), "Low-Sodium".to_string()],
            cuisine: "Mediterranean".to_string(),
        };
        let payload = build_prompt(&profile, &target, &readings(), DEFAULT_READING, &request);

        assert!(payload.user.starts_with(
            "I have Type 2 diabetes. My target glucose range is 90-140 mg/dL. "
        ));
        assert!(payload.user.contains("I'm interested in eating: salmon, quinoa\n"));
        assert!(payload.user.contains("Dietary restrictions: Gluten-Free, Low-Sodium"));
        assert!(payload.user.contains("Cuisine preference: Mediterranean"));
        assert!(payload.user.ends_with("Tips for maintaining stable glucose after this meal"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let a = build_prompt(
            &UserProfile::default(),
            &TargetRange::default(),
            &readings(),
            DEFAULT_READING,
            &request(),
        );
        let b = build_prompt(
            &UserProfile::default(),
            &TargetRange::default(),
            &readings(),
            DEFAULT_READING,
            &request(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_messages_roles() {
        let payload = PromptPayload {
            system: "sys".to_string(),
            user: "usr".to_string(),
        };
        let messages = payload.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "usr");
    }

    #[test]
    fn test_log_current_is_last() {
        let now = date("2024-03-04").and_hms_opt(12, 0, 0).unwrap();
        let mut log = RecommendationLog::new();
        assert!(log.current().is_none());

        log.record("Breakfast", "oats", now);
        let entry = log.record("Lunch", "salad", now);
        assert_eq!(entry.meal_type, "Lunch");

        assert_eq!(log.len(), 2);
        assert_eq!(log.current().unwrap().text, "salad");
        assert_eq!(log.history()[0].text, "oats");
    }
}
