use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse time-of-day bucket derived from a free-text period label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Period {
    Morning,
    Afternoon,
    Evening,
    Other,
}

impl Period {
    /// Periods that group readings for per-period views, in display order.
    pub const CLASSIFIED: [Self; 3] = [Self::Morning, Self::Afternoon, Self::Evening];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "Morning",
            Self::Afternoon => "Afternoon",
            Self::Evening => "Evening",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a period label by case-sensitive substring match on the words
/// "Morning", "Afternoon", "Evening", tried in that order.
///
/// Any label containing one of those words lands in that bucket, so new labels
/// must not mention them outside their intended period.
#[must_use]
pub fn classify(label: &str) -> Period {
    Period::CLASSIFIED
        .into_iter()
        .find(|p| label.contains(p.as_str()))
        .unwrap_or(Period::Other)
}
