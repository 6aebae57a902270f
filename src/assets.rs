use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::frame::MeshCatalog;
use crate::geometry::Geometry;
use crate::obj::ObjMesh;
use crate::program::{ProgramKind, ShaderSources};
use crate::scene::SceneDescription;
use crate::texture::TextureImage;

/// Half extent of the shared cube primitive.
pub const CUBE_HALF_EXTENT: f32 = 0.2;
/// Mesh name of the unit segment the debug overlay is drawn with.
pub const DEBUG_LINE_MESH: &str = "debug_line";

/// CPU copies of everything a scene needs before it can be drawn.
///
/// Meshes and textures keep the order they are uploaded in, so positions in
/// these lists double as [`crate::frame::MeshId`] and
/// [`crate::frame::TextureId`] values.
#[derive(Debug, Clone)]
pub struct SceneAssets {
    pub root: PathBuf,
    pub meshes: Vec<(String, Geometry)>,
    pub textures: Vec<(String, TextureImage)>,
    pub shaders: Vec<(ProgramKind, ShaderSources)>,
}

impl SceneAssets {
    /// Loads models, textures and shader sources relative to `root`.
    pub fn load(scene: &SceneDescription, root: &Path) -> Result<Self> {
        let mut meshes = vec![
            ("cube".to_string(), Geometry::cube(CUBE_HALF_EXTENT)),
            (DEBUG_LINE_MESH.to_string(), Geometry::unit_line()),
        ];
        for model in &scene.models {
            let path = root.join(&model.path);
            let geometry = ObjMesh::load(&path)
                .and_then(ObjMesh::into_geometry)
                .with_context(|| format!("failed to load model `{}`", model.name))?;
            info!(
                "loaded model {} from {} ({} triangles)",
                model.name,
                path.display(),
                geometry.primitive_count()
            );
            meshes.push((model.name.clone(), geometry));
        }

        let mut textures = Vec::with_capacity(scene.textures.len());
        for texture in &scene.textures {
            let image = TextureImage::load(root.join(&texture.path))
                .with_context(|| format!("failed to load texture `{}`", texture.name))?;
            info!(
                "loaded texture {} ({}x{})",
                texture.name,
                image.width(),
                image.height()
            );
            textures.push((texture.name.clone(), image));
        }

        let shader_dir = root.join("shaders");
        let shaders = ProgramKind::ALL
            .into_iter()
            .map(|kind| {
                ShaderSources::load(&shader_dir, kind)
                    .map(|sources| (kind, sources))
                    .with_context(|| format!("failed to load the {kind} program"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root: root.to_path_buf(),
            meshes,
            textures,
            shaders,
        })
    }

    pub fn catalog(&self) -> MeshCatalog {
        let mut catalog = MeshCatalog::new();
        for (name, geometry) in &self.meshes {
            catalog.register(name.clone(), geometry);
        }
        catalog
    }

    pub fn texture_names(&self) -> Vec<String> {
        self.textures.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn shader(&self, kind: ProgramKind) -> Option<&ShaderSources> {
        self.shaders
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, sources)| sources)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::frame::MeshId;

    fn write_shaders(root: &Path) {
        let dir = root.join("shaders");
        fs::create_dir_all(&dir).unwrap();
        for kind in ProgramKind::ALL {
            fs::write(dir.join(format!("{kind}.vert.wgsl")), "fn vs_main() {}").unwrap();
            fs::write(dir.join(format!("{kind}.frag.wgsl")), "fn fs_main() {}").unwrap();
        }
    }

    const SCENE: &str = r#"
    <scene>
        <model name="boat" path="models/boat.obj"/>
        <item name="boat" mesh="boat"/>
    </scene>
    "#;

    #[test]
    fn loads_models_after_builtin_meshes() {
        let dir = tempfile::tempdir().unwrap();
        write_shaders(dir.path());
        fs::create_dir_all(dir.path().join("models")).unwrap();
        fs::write(
            dir.path().join("models/boat.obj"),
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        )
        .unwrap();

        let scene = SceneDescription::from_xml(SCENE).unwrap();
        let assets = SceneAssets::load(&scene, dir.path()).unwrap();
        let catalog = assets.catalog();
        assert_eq!(catalog.id("cube"), Some(MeshId(0)));
        assert_eq!(catalog.id(DEBUG_LINE_MESH), Some(MeshId(1)));
        assert_eq!(catalog.id("boat"), Some(MeshId(2)));
        assert!(assets.shader(ProgramKind::Phong).is_some());
    }

    #[test]
    fn missing_model_names_the_model() {
        let dir = tempfile::tempdir().unwrap();
        write_shaders(dir.path());
        let scene = SceneDescription::from_xml(SCENE).unwrap();
        let err = SceneAssets::load(&scene, dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("boat"));
    }

    #[test]
    fn bundled_assets_load() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets");
        for name in SceneDescription::builtin_names() {
            let scene = SceneDescription::load(name).unwrap();
            let assets = SceneAssets::load(&scene, &root).unwrap();
            assert_eq!(assets.shaders.len(), 2);
        }
    }
}
