// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Primitive types accepted by layers

use std::fmt;

/// How a geometry's indices are assembled into primitives.
///
/// `Solid` and `Surface` are both triangle meshes; a solid is known to be
/// closed, so back faces may be culled when drawing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveType {
    Triangles,
    Solid,
    Surface,
    Lines,
    Points,
}

impl PrimitiveType {
    /// Number of indices consumed by one primitive
    #[inline]
    pub fn vertices_per_primitive(self) -> usize {
        match self {
            PrimitiveType::Triangles | PrimitiveType::Solid | PrimitiveType::Surface => 3,
            PrimitiveType::Lines => 2,
            PrimitiveType::Points => 1,
        }
    }

    /// True for the three triangle-based primitive types
    #[inline]
    pub fn is_triangles(self) -> bool {
        matches!(
            self,
            PrimitiveType::Triangles | PrimitiveType::Solid | PrimitiveType::Surface
        )
    }

    /// Parse the names used by loaders ("triangles", "solid", ...)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "triangles" => Some(PrimitiveType::Triangles),
            "solid" => Some(PrimitiveType::Solid),
            "surface" => Some(PrimitiveType::Surface),
            "lines" => Some(PrimitiveType::Lines),
            "points" => Some(PrimitiveType::Points),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveType::Triangles => "triangles",
            PrimitiveType::Solid => "solid",
            PrimitiveType::Surface => "surface",
            PrimitiveType::Lines => "lines",
            PrimitiveType::Points => "points",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
