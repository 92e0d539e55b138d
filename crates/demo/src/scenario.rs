use serde::Deserialize;
use tilegrid::{CharacterSettings, TileCoord};

pub(crate) type ScenarioResult<T> = Result<T, String>;

pub(crate) const BUILTIN_SCENARIO: &str = r#"{
    "ticks": 900,
    "props": [
        { "name": "well", "tile": { "x": 7, "z": 7 }, "blocking": true,
          "interactionOffset": { "x": 0, "z": -1 } },
        { "name": "crate", "tile": { "x": 4, "z": 9 }, "blocking": true }
    ],
    "characters": [
        { "name": "villager", "spawn": { "x": 1, "z": 1 },
          "approach": "well" },
        { "name": "scout", "spawn": { "x": 12, "z": 2 },
          "destination": { "x": 2, "z": 12 },
          "settings": { "speed": 420 } },
        { "name": "idler", "spawn": { "x": 10, "z": 12 },
          "settings": { "idleVariations": ["Idle_iso_stretch"], "variationProbability": 0.02,
                        "wander": { "probability": 0.05, "stepRadius": 2 } } }
    ]
}"#;

/// Headless run description: static props, characters and what they do.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct Scenario {
    pub(crate) ticks: u32,
    #[serde(default)]
    pub(crate) props: Vec<PropEntry>,
    #[serde(default)]
    pub(crate) characters: Vec<CharacterEntry>,
    #[serde(default)]
    pub(crate) save_map_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct PropEntry {
    pub(crate) name: String,
    pub(crate) tile: TileCoord,
    #[serde(default)]
    pub(crate) blocking: bool,
    #[serde(default)]
    pub(crate) interaction_offset: Option<TileCoord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CharacterEntry {
    pub(crate) name: String,
    pub(crate) spawn: TileCoord,
    #[serde(default)]
    pub(crate) settings: CharacterSettings,
    #[serde(default)]
    pub(crate) destination: Option<TileCoord>,
    /// Name of a prop or character to walk up to.
    #[serde(default)]
    pub(crate) approach: Option<String>,
}

impl Scenario {
    pub(crate) fn from_json_str(raw: &str) -> ScenarioResult<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let scenario: Scenario = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|error| format!("parse scenario json at {}: {}", error.path(), error.inner()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> ScenarioResult<()> {
        let mut names: Vec<&str> = Vec::new();
        let all_names = self
            .props
            .iter()
            .map(|prop| prop.name.as_str())
            .chain(self.characters.iter().map(|character| character.name.as_str()));
        for name in all_names {
            if names.contains(&name) {
                return Err(format!("duplicate scenario name '{name}'"));
            }
            names.push(name);
        }
        for character in &self.characters {
            if let Some(target) = &character.approach {
                if !names.contains(&target.as_str()) {
                    return Err(format!(
                        "character '{}' approaches unknown name '{target}'",
                        character.name
                    ));
                }
            }
        }
        Ok(())
    }
}
