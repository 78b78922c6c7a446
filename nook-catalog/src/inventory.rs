use std::collections::HashSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitKind {
    WholeHouse,
    Room,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::WholeHouse => "whole_house",
            UnitKind::Room => "room",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "whole_house" | "house" => Some(UnitKind::WholeHouse),
            "room" => Some(UnitKind::Room),
            _ => None,
        }
    }
}

/// A rentable unit: the whole house or one of its rooms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryUnit {
    pub id: String,
    pub name: String,
    pub kind: UnitKind,
    /// Nightly price in the canonical currency.
    pub price: i64,
    pub max_guests: u32,
}

/// Physical containment of the single property: one whole-house unit and
/// the rooms inside it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyLayout {
    house_id: String,
    room_ids: Vec<String>,
}

impl PropertyLayout {
    pub fn new(house_id: impl Into<String>, room_ids: Vec<String>) -> Result<Self, InventoryError> {
        let house_id = house_id.into();
        if house_id.trim().is_empty() {
            return Err(InventoryError::InvalidLayout("house id is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for room_id in &room_ids {
            if room_id.trim().is_empty() {
                return Err(InventoryError::InvalidLayout("room id is empty".to_string()));
            }
            if *room_id == house_id {
                return Err(InventoryError::InvalidLayout(format!(
                    "{} is listed both as the house and as a room",
                    room_id
                )));
            }
            if !seen.insert(room_id.as_str()) {
                return Err(InventoryError::InvalidLayout(format!("duplicate room id {}", room_id)));
            }
        }

        Ok(Self { house_id, room_ids })
    }

    pub fn house_id(&self) -> &str {
        &self.house_id
    }

    pub fn kind_of(&self, unit_id: &str) -> Option<UnitKind> {
        if unit_id == self.house_id {
            Some(UnitKind::WholeHouse)
        } else if self.room_ids.iter().any(|r| r == unit_id) {
            Some(UnitKind::Room)
        } else {
            None
        }
    }

    /// Physical spaces a confirmed booking of `unit_id` occupies.
    ///
    /// The whole house occupies every room plus its own id; a room occupies
    /// only itself. Two confirmed bookings conflict exactly when their
    /// dates overlap and their space sets intersect, which is the
    /// whole-house/room exclusivity rule expressed as plain equality.
    pub fn occupied_spaces(&self, unit_id: &str) -> Result<Vec<String>, InventoryError> {
        match self.kind_of(unit_id) {
            Some(UnitKind::WholeHouse) => {
                let mut spaces = Vec::with_capacity(self.room_ids.len() + 1);
                spaces.push(self.house_id.clone());
                spaces.extend(self.room_ids.iter().cloned());
                Ok(spaces)
            }
            Some(UnitKind::Room) => Ok(vec![unit_id.to_string()]),
            None => Err(InventoryError::UnknownUnit(unit_id.to_string())),
        }
    }

    /// Rejects units whose declared kind disagrees with the layout.
    pub fn check_unit(&self, unit: &InventoryUnit) -> Result<(), InventoryError> {
        let expected = self
            .kind_of(&unit.id)
            .ok_or_else(|| InventoryError::UnknownUnit(unit.id.clone()))?;

        if expected != unit.kind {
            return Err(InventoryError::KindMismatch {
                unit_id: unit.id.clone(),
                expected,
                actual: unit.kind,
            });
        }
        if unit.price <= 0 {
            return Err(InventoryError::InvalidUnit(format!("{} must have a positive price", unit.id)));
        }
        if unit.max_guests == 0 {
            return Err(InventoryError::InvalidUnit(format!("{} must allow at least one guest", unit.id)));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InventoryError {
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Unit {unit_id} is a {expected:?} in the property layout, not a {actual:?}")]
    KindMismatch {
        unit_id: String,
        expected: UnitKind,
        actual: UnitKind,
    },

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Invalid property layout: {0}")]
    InvalidLayout(String),
}
