//! JSON exporter for race replays.
//!
//! Exports sampled race frames as JSON for an external visualizer.

use botrace_core::{CompetitorView, RaceEvent, RacePhase, RaceResults};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single sampled frame of the race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub race_number: u64,

    pub phase: RacePhase,

    /// Live competitor state, in lane order
    pub competitors: Vec<CompetitorView>,

    /// Restart countdown shown on the results screen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_in_secs: Option<u64>,

    /// Events since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<FrameEvent>,
}

/// Race event as exported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameEvent {
    Finished { name: String, rank: u32, at_ms: u64 },
    RaceOver { winners: Vec<String>, tie: bool },
    Restarted { race_number: u64 },
}

impl From<&RaceEvent> for FrameEvent {
    fn from(event: &RaceEvent) -> Self {
        match event {
            RaceEvent::Finished { name, rank, at, .. } => FrameEvent::Finished {
                name: name.clone(),
                rank: *rank,
                at_ms: at.as_millis() as u64,
            },
            RaceEvent::RaceOver(results) => FrameEvent::RaceOver {
                winners: results.winners.iter().map(|w| w.name.clone()).collect(),
                tie: results.is_tie(),
            },
            RaceEvent::Restarted { race_number } => FrameEvent::Restarted {
                race_number: *race_number,
            },
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<RaceFrame>,

    /// Results of every completed race
    pub races: Vec<RaceResults>,

    pub passed: bool,
}

impl RaceExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            races: Vec::new(),
            passed: false,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: RaceFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, races: Vec<RaceResults>) {
        self.passed = passed;
        self.races = races;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botrace_core::WinnerSummary;
    use botrace_env::AgentId;
    use std::time::Duration;

    #[test]
    fn test_frame_events_serialize_tagged() {
        let results = RaceResults {
            race_number: 4,
            winners: vec![WinnerSummary {
                agent_id: AgentId::new("a"),
                name: "Alpha".into(),
                karma: 10.0,
                recent_post_title: None,
                finished_at_ms: 51_000,
            }],
            standings: Vec::new(),
        };
        let events: Vec<FrameEvent> = [
            RaceEvent::Finished {
                agent_id: AgentId::new("a"),
                name: "Alpha".into(),
                rank: 1,
                at: Duration::from_millis(51_000),
            },
            RaceEvent::RaceOver(results),
        ]
        .iter()
        .map(FrameEvent::from)
        .collect();

        let json = serde_json::to_value(&events).unwrap();
        assert_eq!(json[0]["kind"], "finished");
        assert_eq!(json[0]["at_ms"], 51_000);
        assert_eq!(json[1]["kind"], "race_over");
        assert_eq!(json[1]["tie"], false);
    }

    #[test]
    fn test_export_tracks_duration() {
        let mut export = RaceExport::new("single_race", 42);
        export.add_frame(RaceFrame {
            time_sec: 12.5,
            race_number: 1,
            phase: RacePhase::Racing,
            competitors: Vec::new(),
            restart_in_secs: None,
            events: Vec::new(),
        });
        export.finalize(true, Vec::new());

        assert_eq!(export.duration_sec, 12.5);
        assert!(export.passed);

        let json = serde_json::to_string(&export).unwrap();
        assert!(json.contains("\"phase\":\"racing\""));
        assert!(!json.contains("restart_in_secs"));
    }
}
