//! Collision shapes and the descriptors that key them
//!
//! A `ShapeDescriptor` is the canonical, hashable description of a body's
//! geometry. Dimensions are quantized to `SHAPE_QUANTUM` when the descriptor is
//! built, so two descriptors are equal exactly when they describe the same
//! shape at that resolution. The collision shape is always built from the
//! quantized values, never from the raw entity dimensions.

use cgmath::{Vector3, Zero};
use serde::{Deserialize, Serialize};

/// Descriptor resolution in meters (1 mm)
pub const SHAPE_QUANTUM: f32 = 0.001;
/// Largest half extent a collision shape may have, in meters
pub const MAX_HALF_EXTENT: f32 = 1000.0;
/// Maximum number of children in a compound shape
pub const MAX_COMPOUND_CHILDREN: usize = 32;

/// Geometry type of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    Box,
    Sphere,
    Capsule,
    Compound,
}

/// One child of a compound entity, in entity-local coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundChild {
    pub shape_type: ShapeType,
    /// Full dimensions (not half extents)
    pub dimensions: Vector3<f32>,
    pub offset: Vector3<f32>,
}

/// Quantized primitive inside a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapePart {
    pub shape_type: ShapeType,
    pub half_extents: [i32; 3],
    pub offset: [i32; 3],
}

/// Canonical description of a body's collision geometry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeDescriptor {
    shape_type: ShapeType,
    parts: Vec<ShapePart>,
}

fn quantize(value: f32) -> i32 {
    // NaN quantizes to zero and is rejected as degenerate when the shape is built
    (value / SHAPE_QUANTUM).round() as i32
}

fn dequantize(value: i32) -> f32 {
    value as f32 * SHAPE_QUANTUM
}

fn quantize_vec(v: Vector3<f32>) -> [i32; 3] {
    [quantize(v.x), quantize(v.y), quantize(v.z)]
}

fn dequantize_vec(v: [i32; 3]) -> Vector3<f32> {
    Vector3::new(dequantize(v[0]), dequantize(v[1]), dequantize(v[2]))
}

/// Half extents of a primitive from its full dimensions
fn primitive_half_extents(shape_type: ShapeType, dimensions: Vector3<f32>) -> Vector3<f32> {
    match shape_type {
        ShapeType::Sphere => {
            let radius = 0.5 * dimensions.x;
            Vector3::new(radius, radius, radius)
        }
        ShapeType::Capsule => {
            // Y-aligned capsule, radius from the X dimension
            let radius = 0.5 * dimensions.x;
            Vector3::new(radius, (0.5 * dimensions.y).max(radius), radius)
        }
        ShapeType::Box | ShapeType::Compound => dimensions * 0.5,
    }
}

impl ShapeDescriptor {
    /// Describe a single primitive centered on the body origin
    pub fn primitive(shape_type: ShapeType, dimensions: Vector3<f32>) -> Self {
        let half_extents = primitive_half_extents(shape_type, dimensions);
        Self {
            shape_type,
            parts: vec![ShapePart {
                shape_type,
                half_extents: quantize_vec(half_extents),
                offset: [0; 3],
            }],
        }
    }

    /// Describe a compound shape; child order is part of the identity
    pub fn compound(children: &[CompoundChild]) -> Self {
        let parts = children
            .iter()
            .map(|child| ShapePart {
                shape_type: child.shape_type,
                half_extents: quantize_vec(primitive_half_extents(child.shape_type, child.dimensions)),
                offset: quantize_vec(child.offset),
            })
            .collect();
        Self {
            shape_type: ShapeType::Compound,
            parts,
        }
    }

    /// Derive the descriptor for an entity's geometry
    pub fn from_geometry(
        shape_type: ShapeType,
        dimensions: Vector3<f32>,
        children: &[CompoundChild],
    ) -> Self {
        match shape_type {
            ShapeType::Compound => Self::compound(children),
            _ => Self::primitive(shape_type, dimensions),
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape_type
    }

    pub fn parts(&self) -> &[ShapePart] {
        &self.parts
    }
}

/// Primitive geometry as the simulation sees it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeKind {
    Box { half_extents: Vector3<f32> },
    Sphere { radius: f32 },
    Capsule { radius: f32, half_height: f32 },
}

impl ShapeKind {
    fn half_extents(&self) -> Vector3<f32> {
        match *self {
            ShapeKind::Box { half_extents } => half_extents,
            ShapeKind::Sphere { radius } => Vector3::new(radius, radius, radius),
            ShapeKind::Capsule { radius, half_height } => {
                Vector3::new(radius, radius + half_height, radius)
            }
        }
    }
}

/// Collision geometry owned by the shape manager
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionShape {
    children: Vec<(Vector3<f32>, ShapeKind)>,
    compound: bool,
    aabb_half_extents: Vector3<f32>,
}

impl CollisionShape {
    /// Build the shape for a descriptor, or `None` if the geometry is degenerate
    pub fn build(descriptor: &ShapeDescriptor) -> Option<Self> {
        let compound = descriptor.shape_type == ShapeType::Compound;
        if descriptor.parts.is_empty() {
            return None;
        }
        if compound && descriptor.parts.len() > MAX_COMPOUND_CHILDREN {
            return None;
        }

        let max_quantized = quantize(MAX_HALF_EXTENT);
        let mut children = Vec::with_capacity(descriptor.parts.len());
        let mut aabb_half_extents: Vector3<f32> = Vector3::zero();

        for part in &descriptor.parts {
            if part.half_extents.iter().any(|&h| h <= 0 || h > max_quantized) {
                return None;
            }
            let half = dequantize_vec(part.half_extents);
            let kind = match part.shape_type {
                ShapeType::Box => ShapeKind::Box { half_extents: half },
                ShapeType::Sphere => ShapeKind::Sphere { radius: half.x },
                ShapeType::Capsule => ShapeKind::Capsule {
                    radius: half.x,
                    half_height: half.y - half.x,
                },
                // Nested compounds are not supported
                ShapeType::Compound => return None,
            };
            let offset = dequantize_vec(part.offset);
            let extent = kind.half_extents();
            aabb_half_extents.x = aabb_half_extents.x.max(offset.x.abs() + extent.x);
            aabb_half_extents.y = aabb_half_extents.y.max(offset.y.abs() + extent.y);
            aabb_half_extents.z = aabb_half_extents.z.max(offset.z.abs() + extent.z);
            children.push((offset, kind));
        }

        Some(Self {
            children,
            compound,
            aabb_half_extents,
        })
    }

    /// Local inertia diagonal for the given mass
    ///
    /// Spheres are exact. Boxes, capsules and compounds use the box formula
    /// over their local bounding box.
    pub fn calculate_local_inertia(&self, mass: f32) -> Vector3<f32> {
        if mass <= 0.0 {
            return Vector3::zero();
        }
        if !self.compound {
            if let Some((_, ShapeKind::Sphere { radius })) = self.children.first() {
                let i = 0.4 * mass * radius * radius;
                return Vector3::new(i, i, i);
            }
        }
        let h = self.aabb_half_extents;
        let (x2, y2, z2) = (h.x * h.x, h.y * h.y, h.z * h.z);
        Vector3::new(
            mass / 3.0 * (y2 + z2),
            mass / 3.0 * (x2 + z2),
            mass / 3.0 * (x2 + y2),
        )
    }

    /// Half extents of the local bounding box around the body origin
    pub fn half_extents(&self) -> Vector3<f32> {
        self.aabb_half_extents
    }

    pub fn is_compound(&self) -> bool {
        self.compound
    }

    pub fn children(&self) -> &[(Vector3<f32>, ShapeKind)] {
        &self.children
    }
}
