//! The mutable game-piece entity and the move applied in an attack round.

use crate::types::{Category, ElementType};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Combatant {
    pub name: String,
    pub max_hp: u32,
    pub current_hp: u32,
    pub physical_attack: u32,
    pub special_attack: u32,
    pub physical_defense: u32,
    pub special_defense: u32,
    pub primary_type: ElementType,
    pub secondary_type: Option<ElementType>,
    /// Attacking-type tag → effectiveness against this combatant.
    /// A missing entry means 1.0.
    pub type_multipliers: HashMap<ElementType, f64>,
    pub moves: Vec<String>,
}

impl Combatant {
    pub fn multiplier_against(&self, element: ElementType) -> f64 {
        self.type_multipliers.get(&element).copied().unwrap_or(1.0)
    }

    /// Overwrite current HP with a committed round value (our own
    /// computation, or the attacker's reconciled one).
    pub fn set_hp(&mut self, hp: u32) {
        self.current_hp = hp.min(self.max_hp);
    }
}

impl fmt::Display for Combatant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{} hp, {})",
            self.name, self.current_hp, self.max_hp, self.primary_type
        )
    }
}

/// The act applied in one attack round.
#[derive(Debug, Clone, PartialEq)]
pub struct Move {
    pub name: String,
    pub element: ElementType,
    /// Reserved schema field; the damage formula does not consult it.
    pub base_power: u32,
}

impl Move {
    /// The engine builds every round's move from the attacker's primary
    /// type tag, keeping the wire behavior of the original protocol: the
    /// move name is narrative, the element decides the category.
    pub fn from_primary_type(name: impl Into<String>, element: ElementType) -> Self {
        Move {
            name: name.into(),
            element,
            base_power: 0,
        }
    }

    pub fn category(&self) -> Category {
        self.element.category()
    }
}
