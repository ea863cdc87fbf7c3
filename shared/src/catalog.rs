//! Building catalog loaded once at session start
//!
//! Templates are immutable and shared between the server session and any
//! client that wants to preview placements, so the catalog is handed out
//! behind an `Arc` and never mutated after construction.

use crate::error::{AuthorityError, Result};
use crate::geometry::{Aabb, Vec3};
use serde::{Deserialize, Serialize};

/// Collider of a building relative to its placement position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    /// Offset of the collider center from the placement position
    pub center: Vec3,
    /// Full dimensions of the collider
    pub size: Vec3,
}

impl Footprint {
    /// Footprint resting on the ground plane at the placement position
    pub fn grounded(size: Vec3) -> Self {
        Self {
            center: Vec3::new(0.0, size.y * 0.5, 0.0),
            size,
        }
    }

    /// World-space box occupied when placed at `position`
    pub fn at(&self, position: Vec3) -> Aabb {
        Aabb::from_center_size(position + self.center, self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingTemplate {
    pub id: u32,
    pub name: String,
    pub price: u32,
    pub footprint: Footprint,
}

impl BuildingTemplate {
    pub fn new(id: u32, name: impl Into<String>, price: u32, footprint: Footprint) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            footprint,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    templates: Vec<BuildingTemplate>,
}

impl Catalog {
    pub fn new(templates: Vec<BuildingTemplate>) -> Self {
        Self { templates }
    }

    /// Resolves a requested building identifier
    pub fn find(&self, id: u32) -> Option<&BuildingTemplate> {
        self.templates.iter().find(|template| template.id == id)
    }

    /// Like [`Catalog::find`] but reports an unknown identifier as an error
    pub fn resolve(&self, id: u32) -> Result<&BuildingTemplate> {
        self.find(id).ok_or(AuthorityError::UnknownTemplate(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildingTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

pub const BASE_TEMPLATE_ID: u32 = 0;

/// Catalog used by the bundled server and client binaries
pub fn default_catalog() -> Catalog {
    Catalog::new(vec![
        BuildingTemplate::new(
            BASE_TEMPLATE_ID,
            "Base",
            1000,
            Footprint::grounded(Vec3::new(4.0, 2.0, 4.0)),
        ),
        BuildingTemplate::new(1, "Barracks", 400, Footprint::grounded(Vec3::new(3.0, 2.0, 3.0))),
        BuildingTemplate::new(2, "Tower", 100, Footprint::grounded(Vec3::new(1.0, 3.0, 1.0))),
        BuildingTemplate::new(3, "Factory", 600, Footprint::grounded(Vec3::new(4.0, 2.0, 3.0))),
        BuildingTemplate::new(4, "Depot", 300, Footprint::grounded(Vec3::new(2.0, 1.0, 2.0))),
    ])
}
