//! Scenario files – an agent, a goal and the skills and principles they use,
//! loaded by the REPL's `/load` command.
//!
//! ```toml
//! [agent]
//! id = "robot"
//! allowed_skills = ["get_key", "open_door"]
//!
//! [goal]
//! description = "leave the room"
//! target_state = { door_open = "true" }
//!
//! [[skills]]
//! id = "open_door"
//! preconditions = { has_key = "true" }
//! postconditions = { door_open = "true" }
//!
//! [[principles]]
//! id = "p.no_violence"
//! affects = "val.safety"
//! logic = { if = [{ in = ["violent", { var = "tags" }] }, "inf", 0] }
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use verity_types::{AgentProfile, Goal, Principle, Skill};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub agent: AgentProfile,
    pub goal: Goal,
    #[serde(default)]
    pub skills: Vec<Skill>,
    /// Appended to any principles declared inline under `[agent]`.
    #[serde(default)]
    pub principles: Vec<Principle>,
}

impl Scenario {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut scenario: Scenario =
            toml::from_str(raw).map_err(|e| format!("Failed to parse scenario: {}", e))?;
        scenario.normalise();
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scenario at {}: {}", path.display(), e))?;
        Self::parse(&raw)
    }

    /// Fold the top-level principles into the agent.  An agent without an
    /// explicit `allowed_skills` list may use every skill in the file.
    fn normalise(&mut self) {
        self.agent.principles.append(&mut self.principles);
        if self.agent.allowed_skills.is_empty() {
            self.agent.allowed_skills = self.skills.iter().map(|s| s.id.clone()).collect();
        }
    }
}
