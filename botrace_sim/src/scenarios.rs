//! Race scenarios for the simulation harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// One race from roster load through the restart countdown
    SingleRace,

    /// Several consecutive races on the same controller
    Marathon,

    /// Roster fetch always fails; every race uses the mock roster
    RosterOutage,

    /// Slow fetches, one agent with permanently malformed activity and
    /// intermittent malformed activity for the rest
    FlakyFeed,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SingleRace,
            ScenarioId::Marathon,
            ScenarioId::RosterOutage,
            ScenarioId::FlakyFeed,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SingleRace => "single_race",
            ScenarioId::Marathon => "marathon",
            ScenarioId::RosterOutage => "roster_outage",
            ScenarioId::FlakyFeed => "flaky_feed",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SingleRace => "8 synthetic agents, one race to restart",
            ScenarioId::Marathon => "5 back-to-back races, race numbers and ranks reset each time",
            ScenarioId::RosterOutage => "agent fetch fails, races run on the mock roster",
            ScenarioId::FlakyFeed => "500ms fetch latency, 1 broken agent, 20% malformed snapshots",
        }
    }

    /// Number of races the scenario runs unless overridden.
    pub fn default_races(&self) -> usize {
        match self {
            ScenarioId::Marathon => 5,
            ScenarioId::FlakyFeed => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_race" | "singlerace" | "single" => Ok(ScenarioId::SingleRace),
            "marathon" => Ok(ScenarioId::Marathon),
            "roster_outage" | "rosteroutage" | "outage" => Ok(ScenarioId::RosterOutage),
            "flaky_feed" | "flakyfeed" | "flaky" => Ok(ScenarioId::FlakyFeed),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
        assert_eq!("FLAKY".parse::<ScenarioId>(), Ok(ScenarioId::FlakyFeed));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
