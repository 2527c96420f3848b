//! The physical environment: material objects standing in the world.
//!
//! Obstacle-loss computation walks these objects and accumulates loss for
//! every shape a transmission path cuts through. Environments are usually
//! loaded from JSON; `PhysicalEnvironment::from_config` builds the runtime
//! shapes and resolves materials from the catalog, rejecting malformed
//! descriptions up front.

use serde::Deserialize;

use crate::common::geometry::{Coord, Cuboid, LineSegment, Polygon, Prism, SegmentIntersection};
use crate::environment::material::{self, Material};
use crate::error::{Error, Result};

/// Shape description as it appears in a scene file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeConfig {
    Cuboid { size: Coord },
    Prism { points: Vec<Coord>, height: f64 },
}

/// Object description as it appears in a scene file. Shape coordinates are
/// object-local; `position` places the shape in the world.
#[derive(Debug, Clone, Deserialize)]
pub struct PhysicalObjectConfig {
    pub name: String,
    pub position: Coord,
    pub shape: ShapeConfig,
    /// Catalog material name, e.g. "brick".
    pub material: String,
}

/// Environment description as it appears in a scene file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhysicalEnvironmentConfig {
    #[serde(default)]
    pub objects: Vec<PhysicalObjectConfig>,
}

/// A built, validated shape.
#[derive(Debug, Clone)]
pub enum Shape {
    Cuboid(Cuboid),
    Prism(Prism),
}

impl Shape {
    pub fn compute_intersection(&self, segment: &LineSegment) -> Option<SegmentIntersection> {
        match self {
            Shape::Cuboid(cuboid) => cuboid.compute_intersection(segment),
            Shape::Prism(prism) => prism.compute_intersection(segment),
        }
    }

    pub fn compute_size(&self) -> Coord {
        match self {
            Shape::Cuboid(cuboid) => cuboid.compute_size(),
            Shape::Prism(prism) => prism.compute_size(),
        }
    }
}

/// A material object placed in the world.
#[derive(Debug, Clone)]
pub struct PhysicalObject {
    pub name: String,
    pub position: Coord,
    pub shape: Shape,
    pub material: Material,
}

/// All material objects of the simulated world.
#[derive(Debug, Clone, Default)]
pub struct PhysicalEnvironment {
    objects: Vec<PhysicalObject>,
}

impl PhysicalEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON environment description and builds it.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PhysicalEnvironmentConfig = serde_json::from_str(text).map_err(|error| {
            Error::InvalidConfiguration(format!("bad environment description: {error}"))
        })?;
        Self::from_config(&config)
    }

    /// Build the runtime environment from a deserialized description.
    /// Unknown materials and degenerate shapes are `InvalidConfiguration`.
    pub fn from_config(config: &PhysicalEnvironmentConfig) -> Result<Self> {
        let mut environment = Self::new();
        for object in &config.objects {
            let shape = match &object.shape {
                ShapeConfig::Cuboid { size } => Shape::Cuboid(Cuboid::new(*size)?),
                ShapeConfig::Prism { points, height } => {
                    Shape::Prism(Prism::new(Polygon::new(points.clone())?, *height)?)
                }
            };
            let material = material::by_name(&object.material)
                .ok_or_else(|| {
                    Error::InvalidConfiguration(format!(
                        "object '{}' references unknown material '{}'",
                        object.name, object.material
                    ))
                })?
                .clone();
            environment.add_object(PhysicalObject {
                name: object.name.clone(),
                position: object.position,
                shape,
                material,
            });
        }
        Ok(environment)
    }

    pub fn add_object(&mut self, object: PhysicalObject) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[PhysicalObject] {
        &self.objects
    }
}
