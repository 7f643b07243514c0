//! Navigation strategies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the engine picks the next transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Follow a precomputed path to the stop state.
    ShortestPath,
    /// Uniformly random among allowed transitions.
    PureRandom,
    /// Unvisited transitions first, then uniformly random.
    #[default]
    SmartRandom,
    /// Same as [`Strategy::SmartRandom`].
    Random,
    /// Reserved. Not implemented.
    FullCoverage,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ShortestPath => "shortest_path",
            Strategy::PureRandom => "pure_random",
            Strategy::SmartRandom => "smart_random",
            Strategy::Random => "random",
            Strategy::FullCoverage => "full_coverage",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "shortest_path" | "shortestpath" => Ok(Strategy::ShortestPath),
            "pure_random" | "purerandom" => Ok(Strategy::PureRandom),
            "smart_random" | "smartrandom" => Ok(Strategy::SmartRandom),
            "random" => Ok(Strategy::Random),
            "full_coverage" | "fullcoverage" => Ok(Strategy::FullCoverage),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}
