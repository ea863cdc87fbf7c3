//! Scripted construction orders for the headless client
//!
//! An order reads `id@x,y,z`, e.g. `2@5,0,0` for a tower at (5, 0, 0).

use shared::geometry::{Quat, Vec3};
use shared::Packet;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderParseError {
    #[error("expected `id@x,y,z`, got `{0}`")]
    MissingSeparator(String),
    #[error("invalid building id `{0}`")]
    InvalidId(String),
    #[error("expected three coordinates, got `{0}`")]
    InvalidPosition(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementOrder {
    pub building_id: u32,
    pub position: Vec3,
}

impl PlacementOrder {
    pub fn to_packet(self) -> Packet {
        Packet::PlaceBuilding {
            building_id: self.building_id,
            position: self.position,
            rotation: Quat::IDENTITY,
        }
    }
}

impl FromStr for PlacementOrder {
    type Err = OrderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, coords) = s
            .split_once('@')
            .ok_or_else(|| OrderParseError::MissingSeparator(s.to_string()))?;

        let building_id = id
            .trim()
            .parse()
            .map_err(|_| OrderParseError::InvalidId(id.to_string()))?;

        let values = coords
            .split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| OrderParseError::InvalidPosition(coords.to_string()))?;

        match values.as_slice() {
            [x, y, z] if values.iter().all(|v| v.is_finite()) => Ok(Self {
                building_id,
                position: Vec3::new(*x, *y, *z),
            }),
            _ => Err(OrderParseError::InvalidPosition(coords.to_string())),
        }
    }
}
