use crate::target::TargetAnalysisResult;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recommendation {
    OnTrack,
    IncreasePace { required_per_day: f64 },
}

impl Recommendation {
    pub fn from_analysis(result: &TargetAnalysisResult) -> Self {
        if result.is_on_track() {
            Recommendation::OnTrack
        } else {
            Recommendation::IncreasePace {
                required_per_day: result.required_per_day,
            }
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::OnTrack => {
                f.write_str("You're on track to meet or exceed your target!")
            }
            Recommendation::IncreasePace { required_per_day } => write!(
                f,
                "You need to sell {} units/day to hit your goal.",
                required_per_day
            ),
        }
    }
}

pub fn recommend(result: &TargetAnalysisResult) -> String {
    Recommendation::from_analysis(result).to_string()
}
