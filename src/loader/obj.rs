//! Wavefront OBJ with optional MTL materials

use std::{collections::HashMap, io::Cursor};

use log::{debug, warn};

use super::{fetch::ResourceResolver, texture::resolve_texture, Loader, ModelFormat};
use crate::{
    error::{ViewerError, ViewerResult},
    scene::{Geometry, MapSlot, Material, Mesh, SceneGraph, SceneNode, TextureId},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct ObjLoader;

impl Loader for ObjLoader {
    fn parse(&self, bytes: &[u8], resolver: &dyn ResourceResolver) -> ViewerResult<SceneGraph> {
        let (models, materials) = tobj::load_obj_buf(
            &mut Cursor::new(bytes),
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
            |path| {
                let reference = path.to_string_lossy();
                match resolver.resolve(&reference) {
                    Ok(mtl) => tobj::load_mtl_buf(&mut Cursor::new(mtl)),
                    Err(e) => {
                        warn!("Material library '{}' unavailable: {}", reference, e);
                        Err(tobj::LoadError::OpenFileFailed)
                    }
                }
            },
        )
        .map_err(|e| ViewerError::parse(ModelFormat::Obj, e.to_string()))?;

        let materials = materials.unwrap_or_else(|e| {
            debug!("No MTL materials ({}), meshes stay unassigned", e);
            Vec::new()
        });

        let mut graph = SceneGraph::new(ModelFormat::Obj);
        let mut textures: HashMap<String, TextureId> = HashMap::new();
        for (i, mtl) in materials.iter().enumerate() {
            let material = convert_material(i, mtl, &mut graph, &mut textures, resolver);
            graph.add_material(material);
        }

        for (i, model) in models.iter().enumerate() {
            let mesh = &model.mesh;
            if mesh.positions.is_empty() || mesh.indices.is_empty() {
                debug!("Skipping empty OBJ group '{}'", model.name);
                continue;
            }

            let positions: Vec<[f32; 3]> = mesh
                .positions
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]])
                .collect();
            let mut geometry = Geometry::new(positions, mesh.indices.clone());
            if !mesh.normals.is_empty() {
                geometry = geometry.with_normals(
                    mesh.normals
                        .chunks_exact(3)
                        .map(|n| [n[0], n[1], n[2]])
                        .collect(),
                );
            }
            if !mesh.texcoords.is_empty() {
                // OBJ puts the texture origin bottom-left
                geometry = geometry.with_uvs(
                    mesh.texcoords
                        .chunks_exact(2)
                        .map(|t| [t[0], 1.0 - t[1]])
                        .collect(),
                );
            }
            geometry
                .validate()
                .map_err(|e| ViewerError::parse(ModelFormat::Obj, format!("{}: {}", model.name, e)))?;

            let material = mesh
                .material_id
                .filter(|&id| id < graph.materials.len())
                .map(crate::scene::MaterialId);
            let name = if model.name.is_empty() {
                format!("object_{}", i)
            } else {
                model.name.clone()
            };
            graph
                .root
                .add_child(SceneNode::new(name).with_mesh(Mesh::new(geometry, material)));
        }

        debug!(
            "OBJ: {} groups, {} materials, {} textures",
            graph.mesh_count(),
            graph.materials.len(),
            graph.textures.len()
        );
        Ok(graph)
    }
}

fn convert_material(
    index: usize,
    mtl: &tobj::Material,
    graph: &mut SceneGraph,
    textures: &mut HashMap<String, TextureId>,
    resolver: &dyn ResourceResolver,
) -> Material {
    let name = if mtl.name.is_empty() {
        format!("material_{}", index)
    } else {
        mtl.name.clone()
    };

    let mut material = Material::new(name)
        .with_opacity(mtl.dissolve.unwrap_or(1.0))
        // Convert shininess to roughness
        .with_roughness(1.0 - (mtl.shininess.unwrap_or(32.0) / 128.0).clamp(0.0, 1.0));
    if let Some([r, g, b]) = mtl.diffuse {
        material = material.with_color(r, g, b);
    }

    let maps = [
        (MapSlot::Albedo, &mtl.diffuse_texture),
        (MapSlot::Normal, &mtl.normal_texture),
        (MapSlot::Specular, &mtl.specular_texture),
        (MapSlot::AmbientOcclusion, &mtl.ambient_texture),
        (MapSlot::Roughness, &mtl.shininess_texture),
        (MapSlot::Alpha, &mtl.dissolve_texture),
    ];
    for (slot, reference) in maps {
        let Some(reference) = reference.as_deref().filter(|r| !r.is_empty()) else {
            continue;
        };
        let id = *textures
            .entry(reference.to_string())
            .or_insert_with(|| graph.add_texture(resolve_texture(resolver, reference)));
        material = material.with_map(slot, id);
    }
    material
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{fetch::NoResources, texture::png_bytes};

    struct MapResolver(HashMap<&'static str, Vec<u8>>);

    impl ResourceResolver for MapResolver {
        fn resolve(&self, reference: &str) -> ViewerResult<Vec<u8>> {
            self.0
                .get(reference)
                .cloned()
                .ok_or_else(|| ViewerError::fetch(format!("missing {}", reference)))
        }
    }

    const QUAD: &str = "mtllib quad.mtl\n\
        o quad\n\
        v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
        vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
        usemtl painted\n\
        f 1/1 2/2 3/3 4/4\n";

    #[test]
    fn quad_is_triangulated_without_mtl() {
        let graph = ObjLoader.parse(QUAD.as_bytes(), &NoResources).unwrap();
        assert_eq!(graph.mesh_count(), 1);
        assert_eq!(graph.face_count(), 2);
        assert!(graph.materials.is_empty());
        graph.root.for_each_mesh(&mut |mesh, _| assert!(mesh.material.is_none()));
    }

    #[test]
    fn mtl_colors_and_maps_are_resolved() {
        let mtl = "newmtl painted\nKd 0.1 0.2 0.3\nd 0.5\nmap_Kd wood.png\n";
        let resolver = MapResolver(HashMap::from([
            ("quad.mtl", mtl.as_bytes().to_vec()),
            ("wood.png", png_bytes(1, 1, [10, 20, 30, 255])),
        ]));
        let graph = ObjLoader.parse(QUAD.as_bytes(), &resolver).unwrap();

        assert_eq!(graph.materials.len(), 1);
        let material = &graph.materials[0];
        assert_eq!(material.name, "painted");
        assert_eq!(material.base_color, Some([0.1, 0.2, 0.3]));
        assert!(material.transparent);
        let albedo = material.map(MapSlot::Albedo).unwrap();
        assert!(graph.texture(albedo).unwrap().loaded);
        graph.root.for_each_mesh(&mut |mesh, _| {
            assert_eq!(mesh.material, Some(crate::scene::MaterialId(0)));
            assert!(mesh.geometry.uvs.is_some());
        });
    }

    #[test]
    fn missing_texture_keeps_map_slot() {
        let mtl = "newmtl painted\nmap_Kd gone.png\n";
        let resolver = MapResolver(HashMap::from([("quad.mtl", mtl.as_bytes().to_vec())]));
        let graph = ObjLoader.parse(QUAD.as_bytes(), &resolver).unwrap();
        let albedo = graph.materials[0].map(MapSlot::Albedo).unwrap();
        assert!(!graph.texture(albedo).unwrap().loaded);
    }

    #[test]
    fn out_of_range_face_is_parse_error() {
        let err = ObjLoader
            .parse(b"v 0 0 0\nv 1 0 0\nf 1 2 9\n", &NoResources)
            .unwrap_err();
        assert!(matches!(err, ViewerError::ParseError { format: ModelFormat::Obj, .. }));
    }
}
