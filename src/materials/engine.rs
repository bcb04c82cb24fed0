//! Visibility heuristics for uploaded materials
//!
//! Many uploaded assets carry materials with no color, pure black color or
//! broken texture references which render invisible or solid black under
//! neutral lighting. Every material is classified into exactly one strategy
//! and repaired in place. Materials that carry any texture map keep every
//! map reference untouched.

use log::{debug, info};
use rand::Rng;

use super::color::Hsl;
use crate::scene::{
    BoundingVolume, Material, MaterialId, ModelSummary, NormalizedScene, SceneGraph, Side,
};

/// Channel value under which a textured material's tint counts as black
pub const NEAR_BLACK_CHANNEL: f32 = 0.2;
/// Tint given to textured materials whose tint would hide the texture
pub const NEUTRAL_TINT: [f32; 3] = [0.8, 0.8, 0.8];
/// HSL lightness under which an untextured color is lifted
pub const DARK_LIGHTNESS: f32 = 0.4;
pub const MIN_LIGHTNESS: f32 = 0.5;
pub const MIN_SATURATION: f32 = 0.6;
pub const SYNTHESIZED_SATURATION: f32 = 0.8;
pub const SYNTHESIZED_LIGHTNESS: f32 = 0.6;

/// Repair branch chosen for a material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Has at least one image map: preserve maps, fix opacity, tint and culling
    Textured,
    /// Has a non-black color: fix opacity and culling, lift dark colors
    Colored,
    /// No usable signal: replace with a generated color
    Synthesized,
}

/// Picks the strategy for `material`
pub fn classify(material: &Material) -> Strategy {
    if material.has_maps() {
        return Strategy::Textured;
    }
    match material.base_color {
        Some(color) if color != [0.0, 0.0, 0.0] && color.iter().all(|c| c.is_finite()) => {
            Strategy::Colored
        }
        _ => Strategy::Synthesized,
    }
}

/// Builds an opaque double-sided material with a random hue
pub fn synthesize_material<R: Rng + ?Sized>(name: impl Into<String>, rng: &mut R) -> Material {
    let hue: f32 = rng.random();
    let [r, g, b] = Hsl::new(hue, SYNTHESIZED_SATURATION, SYNTHESIZED_LIGHTNESS).to_rgb();
    Material::new(name)
        .with_color(r, g, b)
        .with_side(Side::Double)
        .with_roughness(0.6)
}

fn force_visible(material: &mut Material) {
    material.opacity = 1.0;
    material.transparent = false;
    material.side = Side::Double;
}

fn enhance_textured(material: &mut Material) {
    force_visible(material);
    let tint_hides_texture = match material.base_color {
        None => true,
        Some(color) => color.iter().all(|&c| c < NEAR_BLACK_CHANNEL),
    };
    if tint_hides_texture {
        material.base_color = Some(NEUTRAL_TINT);
    }
}

fn enhance_colored(material: &mut Material) {
    force_visible(material);
    let Some(color) = material.base_color else {
        return;
    };
    let hsl = Hsl::from_rgb(color);
    if hsl.l < DARK_LIGHTNESS {
        // Achromatic colors carry hue 0 and lift to a red
        material.base_color = Some(
            Hsl::new(hsl.h, hsl.s.max(MIN_SATURATION), hsl.l.max(MIN_LIGHTNESS)).to_rgb(),
        );
    }
}

/// Counts of what the enhancement pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnhancementReport {
    pub textured: usize,
    pub colored: usize,
    pub synthesized: usize,
    /// Meshes that had no material and received a generated one
    pub assigned: usize,
    /// Geometries whose normals or bounds were recomputed
    pub geometry_repaired: usize,
}

/// A normalized graph whose materials have been made visible
#[derive(Debug, Clone)]
pub struct PreparedScene {
    pub(crate) graph: SceneGraph,
    pub(crate) bounds: BoundingVolume,
    pub(crate) original_bounds: BoundingVolume,
    pub(crate) scale: f32,
    pub(crate) report: EnhancementReport,
}

impl PreparedScene {
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn bounds(&self) -> &BoundingVolume {
        &self.bounds
    }

    pub fn original_bounds(&self) -> &BoundingVolume {
        &self.original_bounds
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn report(&self) -> &EnhancementReport {
        &self.report
    }

    /// Catalog metadata for the prepared model
    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            format: self.graph.format,
            mesh_count: self.graph.mesh_count(),
            vertex_count: self.graph.vertex_count(),
            face_count: self.graph.face_count(),
            material_count: self.graph.materials.len(),
            texture_count: self.graph.textures.len(),
            dimensions: self.original_bounds.dimensions(),
            normalized_dimensions: self.bounds.dimensions(),
            scale: self.scale,
        }
    }
}

/// Runs the clone-then-enhance pass over a session's own graph
pub struct MaterialEngine;

impl MaterialEngine {
    /// Repairs every material once and gives every mesh a material
    pub fn enhance<R: Rng + ?Sized>(mut scene: NormalizedScene, rng: &mut R) -> PreparedScene {
        let mut report = EnhancementReport::default();
        let graph = scene.graph_mut();

        // One pass over the arena: a shared material is handled once
        for index in 0..graph.materials.len() {
            let material = &mut graph.materials[index];
            match classify(material) {
                Strategy::Textured => {
                    enhance_textured(material);
                    report.textured += 1;
                }
                Strategy::Colored => {
                    enhance_colored(material);
                    report.colored += 1;
                }
                Strategy::Synthesized => {
                    let mut replacement = synthesize_material(material.name.clone(), rng);
                    replacement.wireframe = material.wireframe;
                    *material = replacement;
                    report.synthesized += 1;
                }
            }
            debug!("Material '{}' enhanced", graph.materials[index].name);
        }

        let materials = &mut graph.materials;
        graph.root.for_each_mesh_mut(&mut |mesh| {
            let valid = mesh
                .material
                .map(|id| id.0 < materials.len())
                .unwrap_or(false);
            if !valid {
                let name = format!("generated_{}", materials.len());
                materials.push(synthesize_material(name, rng));
                mesh.material = Some(MaterialId(materials.len() - 1));
                report.assigned += 1;
            }
            if mesh.geometry.ensure_normals_and_bounds() {
                report.geometry_repaired += 1;
            }
        });

        info!(
            "Material pass: {} textured, {} colored, {} synthesized, {} assigned, {} geometries repaired",
            report.textured, report.colored, report.synthesized, report.assigned, report.geometry_repaired
        );

        let (graph, bounds, original_bounds, scale) = scene.into_parts();
        PreparedScene {
            graph,
            bounds,
            original_bounds,
            scale,
            report,
        }
    }
}
