use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::by_period::latest_by_period;
use crate::dashboard::{Analysis, Dashboard};
use crate::error::GlucoseError;
use crate::models::{
    DEFAULT_READING, GlucoseReading, MealRequest, NewReading, RecommendationEntry, TargetRange,
    UserProfile, truncate_to_minute, validate_meal_type, validate_period_label,
    validate_reading_value,
};
use crate::period::Period;
use crate::recommendation::{PromptPayload, RecommendationLog, RecommendationProvider, build_prompt};
use crate::store::ReadingStore;
use crate::window::Window;

/// How the last recommendation request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum RequestOutcome {
    Success,
    Failed(String),
}

/// At most one recommendation request is outstanding per session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestState {
    #[default]
    Idle,
    Requesting {
        meal_type: String,
    },
    Done {
        outcome: RequestOutcome,
    },
}

impl RequestState {
    #[must_use]
    pub fn is_requesting(&self) -> bool {
        matches!(self, Self::Requesting { .. })
    }
}

/// A recommendation request that has been started but not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecommendation {
    pub meal_type: &'static str,
    pub payload: PromptPayload,
}

/// Everything one user works with: readings, settings and generated advice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    profile: UserProfile,
    #[serde(default)]
    target: TargetRange,
    #[serde(default)]
    readings: ReadingStore,
    #[serde(default)]
    recommendations: RecommendationLog,
    #[serde(default)]
    revision: u64,
    #[serde(skip)]
    request_state: RequestState,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    #[must_use]
    pub fn target(&self) -> TargetRange {
        self.target
    }

    #[must_use]
    pub fn readings(&self) -> &ReadingStore {
        &self.readings
    }

    #[must_use]
    pub fn recommendations(&self) -> &RecommendationLog {
        &self.recommendations
    }

    #[must_use]
    pub fn request_state(&self) -> &RequestState {
        &self.request_state
    }

    /// Bumped on every mutation; views re-fetch when it changes.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // --- Readings ---

    /// Validate and append a reading. The period label is resolved to its
    /// canonical spelling.
    pub fn log_reading(&mut self, new: NewReading) -> Result<GlucoseReading, GlucoseError> {
        validate_reading_value(new.value)?;
        let period = validate_period_label(&new.period)?;
        let notes = new
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let reading = GlucoseReading {
            date: new.date,
            time: truncate_to_minute(new.time),
            value: new.value,
            period: period.to_string(),
            notes,
        };
        self.readings.append(reading.clone())?;
        self.touch();
        Ok(reading)
    }

    /// Append previously exported readings verbatim. Either all are appended
    /// or none are.
    pub fn import_readings(
        &mut self,
        readings: Vec<GlucoseReading>,
    ) -> Result<usize, GlucoseError> {
        for (i, reading) in readings.iter().enumerate() {
            validate_reading_value(reading.value)
                .map_err(|e| GlucoseError::validation(format!("Row {}: {e}", i + 1)))?;
        }
        let count = readings.len();
        for reading in readings {
            self.readings.append(GlucoseReading {
                time: truncate_to_minute(reading.time),
                ..reading
            })?;
        }
        if count > 0 {
            self.touch();
        }
        Ok(count)
    }

    // --- Settings ---

    pub fn set_target_range(&mut self, min: i64, max: i64) -> Result<TargetRange, GlucoseError> {
        self.target = TargetRange::new(min, max)?;
        self.touch();
        Ok(self.target)
    }

    pub fn set_profile(&mut self, profile: UserProfile) {
        self.profile = UserProfile {
            name: profile.name.trim().to_string(),
            diabetes_type: profile.diabetes_type,
        };
        self.touch();
    }

    // --- Views ---

    #[must_use]
    pub fn dashboard(&self, today: NaiveDate) -> Dashboard {
        Dashboard::build(&self.readings, &self.target, &self.recommendations, today)
    }

    #[must_use]
    pub fn analysis(&self, window: Window, today: NaiveDate) -> Analysis {
        Analysis::build(self.readings.all(), window, &self.target, today)
    }

    /// Period readings the meal planner starts from: the latest reading of
    /// each period, `DEFAULT_READING` where a period has none, then any
    /// explicit overrides.
    pub fn planner_readings(
        &self,
        overrides: &BTreeMap<Period, i64>,
    ) -> Result<BTreeMap<Period, i64>, GlucoseError> {
        let latest = latest_by_period(self.readings.all());
        let mut values = BTreeMap::new();
        for period in Period::CLASSIFIED {
            let value = match overrides.get(&period) {
                Some(&v) => {
                    validate_reading_value(v)?;
                    v
                }
                None => latest.get(&period).map_or(DEFAULT_READING, |r| r.value),
            };
            values.insert(period, value);
        }
        Ok(values)
    }

    // --- Recommendations ---

    pub fn begin_recommendation(
        &mut self,
        request: &MealRequest,
        overrides: &BTreeMap<Period, i64>,
    ) -> Result<PendingRecommendation, GlucoseError> {
        if self.request_state.is_requesting() {
            return Err(GlucoseError::RequestInFlight);
        }
        let meal_type = validate_meal_type(&request.meal_type)?;
        let readings = self.planner_readings(overrides)?;
        let request = MealRequest {
            meal_type: meal_type.to_string(),
            ..request.clone()
        };
        let payload = build_prompt(
            &self.profile,
            &self.target,
            &readings,
            DEFAULT_READING,
            &request,
        );
        self.request_state = RequestState::Requesting {
            meal_type: meal_type.to_string(),
        };
        Ok(PendingRecommendation { meal_type, payload })
    }

    /// Record the collaborator's answer. On failure nothing but the request
    /// state changes, so the request can simply be retried.
    pub fn finish_recommendation(
        &mut self,
        pending: &PendingRecommendation,
        result: anyhow::Result<String>,
        now: NaiveDateTime,
    ) -> Result<&RecommendationEntry, GlucoseError> {
        match result {
            Ok(text) => {
                info!(meal_type = pending.meal_type, "recommendation generated");
                self.request_state = RequestState::Done {
                    outcome: RequestOutcome::Success,
                };
                self.touch();
                Ok(self.recommendations.record(pending.meal_type, text, now))
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(meal_type = pending.meal_type, error = %message, "recommendation failed");
                self.request_state = RequestState::Done {
                    outcome: RequestOutcome::Failed(message.clone()),
                };
                Err(GlucoseError::Recommendation(message))
            }
        }
    }

    /// Blocking request through `provider`.
    pub fn request_recommendation(
        &mut self,
        provider: &dyn RecommendationProvider,
        request: &MealRequest,
        overrides: &BTreeMap<Period, i64>,
        now: NaiveDateTime,
    ) -> Result<&RecommendationEntry, GlucoseError> {
        let pending = self.begin_recommendation(request, overrides)?;
        let result = provider.generate(&pending.payload);
        self.finish_recommendation(&pending, result, now)
    }
}

/// Independent sessions keyed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<Uuid, Session>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> Uuid {
        self.insert(Session::new())
    }

    pub fn insert(&mut self, session: Session) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(id, session);
        id
    }

    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
