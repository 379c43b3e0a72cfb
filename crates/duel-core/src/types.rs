//! Elemental type taxonomy.
//!
//! Eighteen lowercase tags, partitioned into a physical-category set and a
//! special-category set.  The partition decides which attack/defense stat
//! pair the damage formula reads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Normal,
    Fighting,
    Flying,
    Poison,
    Ground,
    Rock,
    Bug,
    Ghost,
    Steel,
    Fire,
    Water,
    Grass,
    Electric,
    Psychic,
    Ice,
    Dragon,
    Dark,
    Fairy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Physical,
    Special,
}

impl ElementType {
    pub const ALL: [ElementType; 18] = [
        ElementType::Normal,
        ElementType::Fighting,
        ElementType::Flying,
        ElementType::Poison,
        ElementType::Ground,
        ElementType::Rock,
        ElementType::Bug,
        ElementType::Ghost,
        ElementType::Steel,
        ElementType::Fire,
        ElementType::Water,
        ElementType::Grass,
        ElementType::Electric,
        ElementType::Psychic,
        ElementType::Ice,
        ElementType::Dragon,
        ElementType::Dark,
        ElementType::Fairy,
    ];

    pub fn category(self) -> Category {
        match self {
            ElementType::Normal
            | ElementType::Fighting
            | ElementType::Flying
            | ElementType::Poison
            | ElementType::Ground
            | ElementType::Rock
            | ElementType::Bug
            | ElementType::Ghost
            | ElementType::Steel => Category::Physical,
            ElementType::Fire
            | ElementType::Water
            | ElementType::Grass
            | ElementType::Electric
            | ElementType::Psychic
            | ElementType::Ice
            | ElementType::Dragon
            | ElementType::Dark
            | ElementType::Fairy => Category::Special,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Normal => "normal",
            ElementType::Fighting => "fighting",
            ElementType::Flying => "flying",
            ElementType::Poison => "poison",
            ElementType::Ground => "ground",
            ElementType::Rock => "rock",
            ElementType::Bug => "bug",
            ElementType::Ghost => "ghost",
            ElementType::Steel => "steel",
            ElementType::Fire => "fire",
            ElementType::Water => "water",
            ElementType::Grass => "grass",
            ElementType::Electric => "electric",
            ElementType::Psychic => "psychic",
            ElementType::Ice => "ice",
            ElementType::Dragon => "dragon",
            ElementType::Dark => "dark",
            ElementType::Fairy => "fairy",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown element type `{0}`")]
pub struct UnknownElementType(pub String);

impl FromStr for ElementType {
    type Err = UnknownElementType;

    /// Tags are lowercase on the wire and in catalogue files; anything else
    /// is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownElementType(s.to_owned()))
    }
}
