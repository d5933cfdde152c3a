//! Procedural spur-gear mesh generation
//!
//! Synthesizes a closed, consistently wound triangle mesh for a spur gear:
//! front and back web faces, tooth caps, the outward faces of each tooth tip,
//! and the inner bore cylinder. Vertices are never shared between patches so
//! every face keeps its own flat normal.

use crate::backend::types::Vertex;
use crate::resources::Mesh;
use glam::Vec3;
use std::f32::consts::PI;
use thiserror::Error;

/// Vertices emitted for each tooth
pub const VERTICES_PER_TOOTH: usize = 40;
/// Triangles emitted for each tooth
pub const TRIANGLES_PER_TOOTH: usize = 22;

/// Rejection reasons for gear parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("gear needs at least one tooth")]
    NoTeeth,
    #[error("gear width must be positive, got {0}")]
    NonPositiveWidth(f32),
    #[error("tooth depth must be positive, got {0}")]
    NonPositiveToothDepth(f32),
    #[error("radii out of order: inner radius {inner} must lie strictly between 0 and the pitch radius {pitch}")]
    RadiiOutOfOrder { inner: f32, pitch: f32 },
}

/// Geometric parameters of a spur gear
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearParams {
    /// Radius of the bore cylinder
    pub inner_radius: f32,
    /// Nominal outer radius; teeth straddle it by half the tooth depth
    pub outer_radius: f32,
    /// Extent along Z
    pub width: f32,
    /// Number of teeth
    pub teeth: u32,
    /// Radial extent of a tooth
    pub tooth_depth: f32,
}

impl GearParams {
    /// Radius of the circle the tooth flanks start from
    pub fn pitch_radius(&self) -> f32 {
        self.outer_radius - self.tooth_depth / 2.0
    }

    /// Radius of the tooth tips
    pub fn tip_radius(&self) -> f32 {
        self.outer_radius + self.tooth_depth / 2.0
    }

    /// Check the radii ordering and counting invariants.
    ///
    /// Misordered radii would silently invert the outward normals, so they
    /// are rejected here instead of during generation.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.teeth < 1 {
            return Err(GeometryError::NoTeeth);
        }
        if !(self.width > 0.0) {
            return Err(GeometryError::NonPositiveWidth(self.width));
        }
        if !(self.tooth_depth > 0.0) {
            return Err(GeometryError::NonPositiveToothDepth(self.tooth_depth));
        }
        let pitch = self.pitch_radius();
        if !(self.inner_radius > 0.0 && self.inner_radius < pitch) {
            return Err(GeometryError::RadiiOutOfOrder {
                inner: self.inner_radius,
                pitch,
            });
        }
        Ok(())
    }
}

/// Which side of the gear a face lies on
#[derive(Debug, Clone, Copy, PartialEq)]
enum Side {
    Front,
    Back,
}

impl Side {
    fn z(self, half_width: f32) -> f32 {
        match self {
            Side::Front => half_width,
            Side::Back => -half_width,
        }
    }

    fn normal(self) -> Vec3 {
        match self {
            Side::Front => Vec3::Z,
            Side::Back => -Vec3::Z,
        }
    }
}

/// Radius selector for the outward tip faces
#[derive(Debug, Clone, Copy)]
enum Ring {
    Pitch,
    Tip,
}

/// Normal rule for one outward tip face
#[derive(Debug, Clone, Copy)]
enum FlankNormal {
    /// Along the leading flank, perpendicular in the gear plane
    Leading,
    /// Radially outward at the given reference angle
    Radial(usize),
    /// Along the trailing flank
    Trailing,
}

/// One outward face of a tooth tip: a front/back quad between two rim points
struct TipFace {
    from: (Ring, usize),
    to: (Ring, usize),
    normal: FlankNormal,
}

/// The four outward faces walked counter-clockwise: leading flank, tip land,
/// trailing flank, and the gap back to the next tooth.
const TIP_FACES: [TipFace; 4] = [
    TipFace {
        from: (Ring::Pitch, 0),
        to: (Ring::Tip, 1),
        normal: FlankNormal::Leading,
    },
    TipFace {
        from: (Ring::Tip, 1),
        to: (Ring::Tip, 2),
        normal: FlankNormal::Radial(1),
    },
    TipFace {
        from: (Ring::Tip, 2),
        to: (Ring::Pitch, 3),
        normal: FlankNormal::Trailing,
    },
    TipFace {
        from: (Ring::Pitch, 3),
        to: (Ring::Pitch, 4),
        normal: FlankNormal::Radial(3),
    },
];

/// Precomputed trigonometry for one tooth: cosine and sine of the five
/// reference angles `ta + k*da`, plus the unit flank directions.
struct ToothFrame {
    cos: [f32; 5],
    sin: [f32; 5],
    leading: Vec3,
    trailing: Vec3,
}

impl ToothFrame {
    fn new(tooth: u32, teeth: u32, pitch: f32, tip: f32) -> Self {
        let ta = tooth as f32 * 2.0 * PI / teeth as f32;
        let da = 2.0 * PI / teeth as f32 / 4.0;

        let mut cos = [0.0; 5];
        let mut sin = [0.0; 5];
        for (k, (c, s)) in cos.iter_mut().zip(sin.iter_mut()).enumerate() {
            let angle = ta + k as f32 * da;
            *c = angle.cos();
            *s = angle.sin();
        }

        let u1 = tip * cos[1] - pitch * cos[0];
        let v1 = tip * sin[1] - pitch * sin[0];
        let len1 = (u1 * u1 + v1 * v1).sqrt();
        let u2 = pitch * cos[3] - tip * cos[2];
        let v2 = pitch * sin[3] - tip * sin[2];
        let len2 = (u2 * u2 + v2 * v2).sqrt();

        Self {
            cos,
            sin,
            leading: Vec3::new(v1 / len1, -u1 / len1, 0.0),
            trailing: Vec3::new(v2 / len2, -u2 / len2, 0.0),
        }
    }

    /// Point on the circle of `radius` at reference angle `k`
    fn point(&self, radius: f32, k: usize) -> (f32, f32) {
        (radius * self.cos[k], radius * self.sin[k])
    }

    /// Outward radial unit vector at reference angle `k`
    fn radial(&self, k: usize) -> Vec3 {
        Vec3::new(self.cos[k], self.sin[k], 0.0)
    }
}

struct GearBuilder {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    color: Vec3,
}

impl GearBuilder {
    fn vertex(&mut self, x: f32, y: f32, z: f32, normal: Vec3) -> u32 {
        self.vertices.push(Vertex {
            position: Vec3::new(x, y, z),
            normal,
            color: self.color,
        });
        (self.vertices.len() - 1) as u32
    }

    fn triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }
}

/// Annulus strip between the bore and the pitch circle on one side.
///
/// Emitted as three (inner, pitch) vertex pairs; the back side swaps the
/// order within each pair, which mirrors the winding.
fn web_face(b: &mut GearBuilder, f: &ToothFrame, inner: f32, pitch: f32, half_width: f32, side: Side) {
    // (inner angle index, pitch angle index) per pair
    const PAIRS: [(usize, usize); 3] = [(0, 0), (0, 3), (4, 4)];

    let z = side.z(half_width);
    let normal = side.normal();
    let mut ix = [0u32; 6];
    for (k, &(ai, ap)) in PAIRS.iter().enumerate() {
        let inner_pt = f.point(inner, ai);
        let pitch_pt = f.point(pitch, ap);
        let (first, second) = match side {
            Side::Front => (inner_pt, pitch_pt),
            Side::Back => (pitch_pt, inner_pt),
        };
        ix[2 * k] = b.vertex(first.0, first.1, z, normal);
        ix[2 * k + 1] = b.vertex(second.0, second.1, z, normal);
    }
    b.triangle(ix[0], ix[1], ix[2]);
    b.triangle(ix[1], ix[3], ix[2]);
    b.triangle(ix[2], ix[3], ix[4]);
    b.triangle(ix[3], ix[5], ix[4]);
}

/// Face connecting the pitch circle to the tooth tip on one side.
///
/// The back side reverses the pair order, mirroring the winding.
fn tooth_cap(b: &mut GearBuilder, f: &ToothFrame, pitch: f32, tip: f32, half_width: f32, side: Side) {
    // (pitch angle index, tip angle index) per pair
    const PAIRS: [(usize, usize); 2] = [(0, 1), (3, 2)];

    let z = side.z(half_width);
    let normal = side.normal();
    let order: [usize; 2] = match side {
        Side::Front => [0, 1],
        Side::Back => [1, 0],
    };
    let mut ix = [0u32; 4];
    for (k, &p) in order.iter().enumerate() {
        let (ap, at) = PAIRS[p];
        let pitch_pt = f.point(pitch, ap);
        let tip_pt = f.point(tip, at);
        ix[2 * k] = b.vertex(pitch_pt.0, pitch_pt.1, z, normal);
        ix[2 * k + 1] = b.vertex(tip_pt.0, tip_pt.1, z, normal);
    }
    b.triangle(ix[0], ix[1], ix[2]);
    b.triangle(ix[1], ix[3], ix[2]);
}

/// The four outward faces of one tooth tip, each a front/back quad
fn tip_faces(b: &mut GearBuilder, f: &ToothFrame, pitch: f32, tip: f32, half_width: f32) {
    let radius = |ring: Ring| match ring {
        Ring::Pitch => pitch,
        Ring::Tip => tip,
    };

    for face in &TIP_FACES {
        let normal = match face.normal {
            FlankNormal::Leading => f.leading,
            FlankNormal::Radial(k) => f.radial(k),
            FlankNormal::Trailing => f.trailing,
        };
        let (xa, ya) = f.point(radius(face.from.0), face.from.1);
        let (xb, yb) = f.point(radius(face.to.0), face.to.1);

        let ix0 = b.vertex(xa, ya, half_width, normal);
        let ix1 = b.vertex(xa, ya, -half_width, normal);
        let ix2 = b.vertex(xb, yb, half_width, normal);
        let ix3 = b.vertex(xb, yb, -half_width, normal);
        b.triangle(ix0, ix1, ix2);
        b.triangle(ix1, ix3, ix2);
    }
}

/// One segment of the inner bore cylinder, normals pointing into the bore
fn bore_segment(b: &mut GearBuilder, f: &ToothFrame, inner: f32, half_width: f32) {
    let n0 = -f.radial(0);
    let n4 = -f.radial(4);
    let (x0, y0) = f.point(inner, 0);
    let (x4, y4) = f.point(inner, 4);

    let ix0 = b.vertex(x0, y0, -half_width, n0);
    let ix1 = b.vertex(x0, y0, half_width, n0);
    let ix2 = b.vertex(x4, y4, -half_width, n4);
    let ix3 = b.vertex(x4, y4, half_width, n4);
    b.triangle(ix0, ix1, ix2);
    b.triangle(ix1, ix3, ix2);
}

/// Generate the gear mesh.
///
/// Pure function of its inputs: identical parameters produce bit-identical
/// vertex and index arrays. Parameters are validated before any geometry is
/// emitted.
pub fn generate(params: &GearParams, color: Vec3) -> Result<Mesh, GeometryError> {
    params.validate()?;

    let inner = params.inner_radius;
    let pitch = params.pitch_radius();
    let tip = params.tip_radius();
    let half_width = params.width * 0.5;

    let teeth = params.teeth as usize;
    let mut builder = GearBuilder {
        vertices: Vec::with_capacity(teeth * VERTICES_PER_TOOTH),
        indices: Vec::with_capacity(teeth * TRIANGLES_PER_TOOTH * 3),
        color,
    };

    for tooth in 0..params.teeth {
        let frame = ToothFrame::new(tooth, params.teeth, pitch, tip);
        web_face(&mut builder, &frame, inner, pitch, half_width, Side::Front);
        tooth_cap(&mut builder, &frame, pitch, tip, half_width, Side::Front);
        web_face(&mut builder, &frame, inner, pitch, half_width, Side::Back);
        tooth_cap(&mut builder, &frame, pitch, tip, half_width, Side::Back);
        tip_faces(&mut builder, &frame, pitch, tip, half_width);
        bore_segment(&mut builder, &frame, inner, half_width);
    }

    log::debug!(
        "generated gear mesh: {} teeth, {} vertices, {} triangles",
        params.teeth,
        builder.vertices.len(),
        builder.indices.len() / 3
    );

    Ok(Mesh {
        vertices: builder.vertices,
        indices: builder.indices,
        name: "gear".to_string(),
    })
}
