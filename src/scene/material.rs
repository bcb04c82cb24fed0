//! Surface materials and textures as loaded from model files
//!
//! Materials live in a per-graph arena and meshes reference them by
//! [`MaterialId`]. The arena index is the material's identity: meshes that
//! share an id share the material, exactly as in the source file.

use std::collections::BTreeMap;

/// Index of a material in its graph's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub usize);

/// Index of a texture in its graph's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// Image-based map slots a material may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapSlot {
    Albedo,
    Normal,
    Bump,
    Roughness,
    Metalness,
    Alpha,
    Emissive,
    Environment,
    Light,
    AmbientOcclusion,
    Specular,
}

impl MapSlot {
    pub const ALL: [MapSlot; 11] = [
        MapSlot::Albedo,
        MapSlot::Normal,
        MapSlot::Bump,
        MapSlot::Roughness,
        MapSlot::Metalness,
        MapSlot::Alpha,
        MapSlot::Emissive,
        MapSlot::Environment,
        MapSlot::Light,
        MapSlot::AmbientOcclusion,
        MapSlot::Specular,
    ];
}

/// Which faces are rasterized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// Material definition
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// Linear RGB base color, `None` when the source left it unset
    pub base_color: Option<[f32; 3]>,
    pub maps: BTreeMap<MapSlot, TextureId>,
    pub opacity: f32,
    pub transparent: bool,
    pub side: Side,
    pub wireframe: bool,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: [f32; 3],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            base_color: None,
            maps: BTreeMap::new(),
            opacity: 1.0,
            transparent: false,
            side: Side::Front,
            wireframe: false,
            metallic: 0.0,
            roughness: 0.5,
            emissive: [0.0, 0.0, 0.0],
        }
    }
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder pattern: Set base color from RGB values
    pub fn with_color(mut self, r: f32, g: f32, b: f32) -> Self {
        self.base_color = Some([r, g, b]);
        self
    }

    /// Builder pattern: Set opacity, marking the material transparent below 1
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self.transparent = self.opacity < 1.0;
        self
    }

    pub fn with_map(mut self, slot: MapSlot, texture: TextureId) -> Self {
        self.maps.insert(slot, texture);
        self
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_emission(mut self, r: f32, g: f32, b: f32) -> Self {
        self.emissive = [r, g, b];
        self
    }

    pub fn has_maps(&self) -> bool {
        !self.maps.is_empty()
    }

    pub fn map(&self, slot: MapSlot) -> Option<TextureId> {
        self.maps.get(&slot).copied()
    }
}

/// Decoded image referenced by materials
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    /// URI, file name or embedded label the image came from
    pub source: String,
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixels, empty unless `loaded`
    pub pixels: Vec<u8>,
    pub loaded: bool,
}

impl Texture {
    pub fn from_rgba(source: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4));
        let loaded = width > 0 && height > 0 && expected == Some(pixels.len());
        Self {
            source: source.into(),
            width,
            height,
            pixels: if loaded { pixels } else { Vec::new() },
            loaded,
        }
    }

    /// A reference whose image could not be fetched or decoded
    pub fn unresolved(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            width: 0,
            height: 0,
            pixels: Vec::new(),
            loaded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opacity_below_one_marks_transparent() {
        let material = Material::new("glass").with_opacity(0.3);
        assert!(material.transparent);
        assert!(!Material::new("solid").with_opacity(1.0).transparent);
    }

    #[test]
    fn texture_with_wrong_payload_is_not_loaded() {
        let texture = Texture::from_rgba("a.png", 2, 2, vec![0; 3]);
        assert!(!texture.loaded);
        assert!(texture.pixels.is_empty());
        assert!(Texture::from_rgba("b.png", 1, 1, vec![255; 4]).loaded);
    }

    #[test]
    fn huge_declared_dimensions_do_not_overflow() {
        let texture = Texture::from_rgba("huge.png", u32::MAX, u32::MAX, Vec::new());
        assert!(!texture.loaded);
    }
}
