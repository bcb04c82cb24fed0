//! Image decoding for material maps
//!
//! A texture that cannot be fetched or decoded never fails the load. It is
//! kept as an unresolved reference so the material still counts as textured.

use log::warn;

use super::fetch::ResourceResolver;
use crate::scene::Texture;

/// Decodes PNG or JPEG bytes into an RGBA8 texture
pub fn decode_texture(source: &str, bytes: &[u8]) -> Texture {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let rgba = img.to_rgba8();
            let (width, height) = rgba.dimensions();
            Texture::from_rgba(source, width, height, rgba.into_raw())
        }
        Err(e) => {
            warn!("Could not decode texture '{}': {}", source, e);
            Texture::unresolved(source)
        }
    }
}

/// Fetches `reference` through `resolver` and decodes it
pub fn resolve_texture(resolver: &dyn ResourceResolver, reference: &str) -> Texture {
    match resolver.resolve(reference) {
        Ok(bytes) => decode_texture(reference, &bytes),
        Err(e) => {
            warn!("Texture '{}' unavailable: {}", reference, e);
            Texture::unresolved(reference)
        }
    }
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fetch::NoResources;

    #[test]
    fn png_decodes_to_rgba() {
        let texture = decode_texture("red.png", &png_bytes(2, 3, [255, 0, 0, 255]));
        assert!(texture.loaded);
        assert_eq!((texture.width, texture.height), (2, 3));
        assert_eq!(&texture.pixels[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn garbage_is_kept_unresolved() {
        let texture = decode_texture("bad.png", b"not an image");
        assert!(!texture.loaded);
        assert_eq!(texture.source, "bad.png");
    }

    #[test]
    fn missing_reference_is_kept_unresolved() {
        let texture = resolve_texture(&NoResources, "missing.jpg");
        assert!(!texture.loaded);
    }
}
