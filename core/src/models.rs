use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::GlucoseError;

/// Lowest reading (mg/dL) accepted by the log.
pub const MIN_READING: i64 = 40;
/// Highest reading (mg/dL) accepted by the log.
pub const MAX_READING: i64 = 500;
/// Bounds of the target range input control.
pub const TARGET_FLOOR: i64 = 70;
pub const TARGET_CEILING: i64 = 200;
/// Stand-in for a period with no readings when planning meals.
pub const DEFAULT_READING: i64 = 120;

pub const PERIOD_LABELS: &[&str] = &[
    "Morning (Before Breakfast)",
    "Morning (After Breakfast)",
    "Afternoon (Before Lunch)",
    "Afternoon (After Lunch)",
    "Evening (Before Dinner)",
    "Evening (After Dinner)",
    "Bedtime",
    "Other",
];

pub const MEAL_TYPES: &[&str] = &["Breakfast", "Lunch", "Dinner", "Snack"];

pub const DIETARY_RESTRICTIONS: &[&str] = &[
    "None",
    "Vegetarian",
    "Vegan",
    "Gluten-Free",
    "Dairy-Free",
    "Low-Carb",
    "Low-Sugar",
    "Low-Sodium",
];

pub const CUISINES: &[&str] = &[
    "Any",
    "Mediterranean",
    "Asian",
    "Mexican",
    "Italian",
    "American",
    "Indian",
    "Other",
];

/// Cuisine value meaning "no preference".
pub const ANY_CUISINE: &str = "Any";

/// Serialises a time of day as `HH:MM`, accepting `HH:MM:SS` when reading.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time(&raw).map_err(D::Error::custom)
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`, truncated to the minute).
pub fn parse_time(s: &str) -> Result<NaiveTime, GlucoseError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, hhmm::FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map(truncate_to_minute)
        .map_err(|_| GlucoseError::validation(format!("Invalid time '{s}'. Use HH:MM (24h)")))
}

/// Readings are kept at minute resolution, matching the `HH:MM` storage format.
#[must_use]
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

pub fn parse_date(s: &str) -> Result<NaiveDate, GlucoseError> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| GlucoseError::validation(format!("Invalid date '{s}'. Use YYYY-MM-DD")))
}

/// One logged glucose measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlucoseReading {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    /// mg/dL
    pub value: i64,
    /// Stored verbatim; see [`crate::period::classify`].
    pub period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl GlucoseReading {
    #[must_use]
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// Reading as submitted by a host, before the period label is resolved.
#[derive(Debug, Clone)]
pub struct NewReading {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub value: i64,
    pub period: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRange {
    pub min: i64,
    pub max: i64,
}

impl Default for TargetRange {
    fn default() -> Self {
        Self { min: 80, max: 130 }
    }
}

impl TargetRange {
    /// Range as accepted from an input control: `min < max`, both within 70-200.
    pub fn new(min: i64, max: i64) -> Result<Self, GlucoseError> {
        let bounds = TARGET_FLOOR..=TARGET_CEILING;
        if !bounds.contains(&min) || !bounds.contains(&max) {
            return Err(GlucoseError::validation(format!(
                "Target range bounds must be between {TARGET_FLOOR} and {TARGET_CEILING} mg/dL"
            )));
        }
        if min >= max {
            return Err(GlucoseError::validation(format!(
                "Target range minimum ({min}) must be below maximum ({max})"
            )));
        }
        Ok(Self { min, max })
    }

    /// Inclusive at both ends.
    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) as f64 / 2.0
    }
}

impl fmt::Display for TargetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} mg/dL", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiabetesType {
    #[serde(rename = "Type 1")]
    Type1,
    #[serde(rename = "Type 2")]
    Type2,
    Gestational,
    #[serde(rename = "Pre-diabetes")]
    PreDiabetes,
}

impl DiabetesType {
    pub const ALL: [Self; 4] = [Self::Type1, Self::Type2, Self::Gestational, Self::PreDiabetes];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Type1 => "Type 1",
            Self::Type2 => "Type 2",
            Self::Gestational => "Gestational",
            Self::PreDiabetes => "Pre-diabetes",
        }
    }
}

impl fmt::Display for DiabetesType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DiabetesType {
    type Err = GlucoseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "type1" | "t1" | "1" => Ok(Self::Type1),
            "type2" | "t2" | "2" => Ok(Self::Type2),
            "gestational" => Ok(Self::Gestational),
            "prediabetes" => Ok(Self::PreDiabetes),
            _ => Err(GlucoseError::validation(format!(
                "Invalid diabetes type '{s}'. Must be one of: Type 1, Type 2, Gestational, Pre-diabetes"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub diabetes_type: Option<DiabetesType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationEntry {
    pub timestamp: NaiveDateTime,
    pub meal_type: String,
    pub text: String,
}

impl RecommendationEntry {
    #[must_use]
    pub fn heading(&self) -> String {
        format!(
            "{} - {} Recommendation",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.meal_type
        )
    }
}

/// Food preferences collected by the meal planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealRequest {
    pub meal_type: String,
    #[serde(default)]
    pub foods: String,
    #[serde(default)]
    pub restrictions: Vec<String>,
    #[serde(default = "default_cuisine")]
    pub cuisine: String,
}

fn default_cuisine() -> String {
    ANY_CUISINE.to_string()
}

pub fn validate_reading_value(value: i64) -> Result<(), GlucoseError> {
    if (MIN_READING..=MAX_READING).contains(&value) {
        Ok(())
    } else {
        Err(GlucoseError::validation(format!(
            "Glucose reading must be between {MIN_READING} and {MAX_READING} mg/dL (got {value})"
        )))
    }
}

/// Resolve a period label to its canonical spelling (case-insensitive).
pub fn validate_period_label(label: &str) -> Result<&'static str, GlucoseError> {
    let trimmed = label.trim();
    PERIOD_LABELS
        .iter()
        .find(|p| p.eq_ignore_ascii_case(trimmed))
        .copied()
        .ok_or_else(|| {
            GlucoseError::validation(format!(
                "Invalid period '{label}'. Must be one of: {}",
                PERIOD_LABELS.join(", ")
            ))
        })
}

/// Resolve a meal type to its canonical spelling (case-insensitive).
pub fn validate_meal_type(meal: &str) -> Result<&'static str, GlucoseError> {
    MEAL_TYPES
        .iter()
        .find(|m| m.eq_ignore_ascii_case(meal.trim()))
        .copied()
        .ok_or_else(|| {
            GlucoseError::validation(format!(
                "Invalid meal type '{meal}'. Must be one of: {}",
                MEAL_TYPES.join(", ")
            ))
        })
}
