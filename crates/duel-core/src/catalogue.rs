//! Combatant catalogue: lowercase name → template.
//!
//! The catalogue file is a JSON object keyed by lookup name.  Keys are
//! lowercased on load and lookups normalize the same way; an unknown name
//! makes the enclosing BATTLE_SETUP malformed at the dispatcher.

use crate::combatant::Combatant;
use crate::types::ElementType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantTemplate {
    pub display_name: String,
    pub max_hp: u32,
    pub physical_attack: u32,
    pub special_attack: u32,
    pub physical_defense: u32,
    pub special_defense: u32,
    pub primary_type: ElementType,
    #[serde(default)]
    pub secondary_type: Option<ElementType>,
    #[serde(default)]
    pub type_multipliers: HashMap<ElementType, f64>,
    #[serde(default)]
    pub moves: Vec<String>,
}

impl CombatantTemplate {
    /// A fresh combatant at full health.
    pub fn instantiate(&self) -> Combatant {
        Combatant {
            name: self.display_name.clone(),
            max_hp: self.max_hp,
            current_hp: self.max_hp,
            physical_attack: self.physical_attack,
            special_attack: self.special_attack,
            physical_defense: self.physical_defense,
            special_defense: self.special_defense,
            primary_type: self.primary_type,
            secondary_type: self.secondary_type,
            type_multipliers: self.type_multipliers.clone(),
            moves: self.moves.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("reading catalogue file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing catalogue: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    entries: HashMap<String, CombatantTemplate>,
}

impl Catalogue {
    pub fn from_json_str(json: &str) -> Result<Self, CatalogueError> {
        let raw: HashMap<String, CombatantTemplate> = serde_json::from_str(json)?;
        let mut entries = HashMap::with_capacity(raw.len());
        for (name, template) in raw {
            entries.insert(name.to_lowercase(), template);
        }
        Ok(Catalogue { entries })
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogueError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogueError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn insert(&mut self, name: &str, template: CombatantTemplate) {
        self.entries.insert(name.to_lowercase(), template);
    }

    pub fn lookup(&self, name: &str) -> Option<&CombatantTemplate> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The small catalogue shipped for demos and tests.
    pub fn builtin() -> Self {
        let mut catalogue = Catalogue::default();
        catalogue.insert(
            "charmander",
            CombatantTemplate {
                display_name: "Charmander".to_owned(),
                max_hp: 39,
                physical_attack: 52,
                special_attack: 60,
                physical_defense: 43,
                special_defense: 50,
                primary_type: ElementType::Fire,
                secondary_type: None,
                type_multipliers: HashMap::from([
                    (ElementType::Water, 2.0),
                    (ElementType::Ground, 2.0),
                    (ElementType::Rock, 2.0),
                    (ElementType::Grass, 0.5),
                    (ElementType::Ice, 0.5),
                    (ElementType::Fire, 0.5),
                ]),
                moves: vec!["scratch".to_owned(), "ember".to_owned()],
            },
        );
        catalogue.insert(
            "squirtle",
            CombatantTemplate {
                display_name: "Squirtle".to_owned(),
                max_hp: 44,
                physical_attack: 48,
                special_attack: 50,
                physical_defense: 65,
                special_defense: 64,
                primary_type: ElementType::Water,
                secondary_type: None,
                type_multipliers: HashMap::from([
                    (ElementType::Electric, 2.0),
                    (ElementType::Grass, 2.0),
                    (ElementType::Fire, 0.5),
                    (ElementType::Water, 0.5),
                    (ElementType::Ice, 0.5),
                ]),
                moves: vec!["tackle".to_owned(), "water gun".to_owned()],
            },
        );
        catalogue.insert(
            "bulbasaur",
            CombatantTemplate {
                display_name: "Bulbasaur".to_owned(),
                max_hp: 45,
                physical_attack: 49,
                special_attack: 65,
                physical_defense: 49,
                special_defense: 65,
                primary_type: ElementType::Grass,
                secondary_type: Some(ElementType::Poison),
                type_multipliers: HashMap::from([
                    (ElementType::Fire, 2.0),
                    (ElementType::Ice, 2.0),
                    (ElementType::Flying, 2.0),
                    (ElementType::Psychic, 2.0),
                    (ElementType::Water, 0.5),
                    (ElementType::Grass, 0.5),
                    (ElementType::Electric, 0.5),
                ]),
                moves: vec!["tackle".to_owned(), "vine whip".to_owned()],
            },
        );
        catalogue.insert(
            "pikachu",
            CombatantTemplate {
                display_name: "Pikachu".to_owned(),
                max_hp: 35,
                physical_attack: 55,
                special_attack: 50,
                physical_defense: 40,
                special_defense: 50,
                primary_type: ElementType::Electric,
                secondary_type: None,
                type_multipliers: HashMap::from([
                    (ElementType::Ground, 2.0),
                    (ElementType::Electric, 0.5),
                    (ElementType::Flying, 0.5),
                    (ElementType::Steel, 0.5),
                ]),
                moves: vec!["quick attack".to_owned(), "thunder shock".to_owned()],
            },
        );
        catalogue
    }
}
