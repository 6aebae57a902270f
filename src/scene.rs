use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Vec3};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::animation::{Animations, Oscillator};
use crate::frame::DepthMode;

/// Meshes every scene can reference without declaring a model.
pub const BUILTIN_MESHES: [&str; 1] = ["cube"];

const BUILTIN_SCENES: [(&str, &str); 2] = [
    ("caribbean", include_str!("../assets/scenes/caribbean.xml")),
    ("clouds", include_str!("../assets/scenes/clouds.xml")),
];

/// A number in the scene file, either literal or bound to an animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Const(f32),
    Animated(String),
}

impl Scalar {
    pub fn resolve(&self, animations: &Animations) -> f32 {
        match self {
            Scalar::Const(value) => *value,
            // references are checked at parse time
            Scalar::Animated(name) => animations.get(name).unwrap_or_default(),
        }
    }

    fn animation(&self) -> Option<&str> {
        match self {
            Scalar::Const(_) => None,
            Scalar::Animated(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vec3Expr(pub [Scalar; 3]);

impl Vec3Expr {
    pub fn constant(value: Vec3) -> Self {
        Self(value.to_array().map(Scalar::Const))
    }

    pub fn resolve(&self, animations: &Animations) -> Vec3 {
        let [x, y, z] = &self.0;
        Vec3::new(
            x.resolve(animations),
            y.resolve(animations),
            z.resolve(animations),
        )
    }
}

/// One step of an item's model matrix. Steps are post-multiplied in
/// document order, so the last step is applied to the mesh first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformStep {
    Translate(Vec3Expr),
    /// Angle in degrees around an axis that need not be normalised.
    Rotate { angle: Scalar, axis: Vec3Expr },
    Scale(Vec3Expr),
}

impl TransformStep {
    pub fn matrix(&self, animations: &Animations) -> Mat4 {
        match self {
            TransformStep::Translate(offset) => Mat4::from_translation(offset.resolve(animations)),
            TransformStep::Rotate { angle, axis } => {
                let axis = axis.resolve(animations);
                if axis.length_squared() <= f32::EPSILON {
                    return Mat4::IDENTITY;
                }
                Mat4::from_axis_angle(axis.normalize(), angle.resolve(animations).to_radians())
            }
            TransformStep::Scale(factor) => Mat4::from_scale(factor.resolve(animations)),
        }
    }

    fn scalars(&self) -> Vec<&Scalar> {
        match self {
            TransformStep::Translate(v) | TransformStep::Scale(v) => v.0.iter().collect(),
            TransformStep::Rotate { angle, axis } => {
                std::iter::once(angle).chain(axis.0.iter()).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub shininess: f32,
    pub specular: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            shininess: 32.0,
            specular: 0.5,
        }
    }
}

/// A mesh placed in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneItem {
    pub name: String,
    pub mesh: String,
    pub color: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub depth: DepthMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default)]
    pub material: Material,
    pub steps: Vec<TransformStep>,
}

impl SceneItem {
    pub fn model_matrix(&self, animations: &Animations) -> Mat4 {
        self.steps
            .iter()
            .fold(Mat4::IDENTITY, |model, step| model * step.matrix(animations))
    }

    pub fn is_cloud(&self) -> bool {
        self.group.as_deref() == Some("clouds")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationSpec {
    pub min: f32,
    pub max: f32,
    pub start: f32,
    pub speed: f32,
}

impl AnimationSpec {
    pub fn oscillator(&self) -> Oscillator {
        Oscillator::new(self.min, self.max, self.start, self.speed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.2, -1.0, -0.3),
            color: Vec3::ONE,
            ambient: 0.3,
            diffuse: 0.7,
            specular: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub position: Vec3Expr,
    pub color: Vec3,
    pub intensity: Scalar,
}

/// Point light with its animated values bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl PointLight {
    pub fn resolve(&self, animations: &Animations) -> ResolvedPointLight {
        ResolvedPointLight {
            position: self.position.resolve(animations),
            color: self.color,
            intensity: self.intensity.resolve(animations),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraStart {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for CameraStart {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            yaw: -90.0,
            pitch: 0.0,
        }
    }
}

/// Everything a frame loop needs to know to draw one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    pub name: String,
    pub clear_color: Vec3,
    #[serde(default)]
    pub camera: CameraStart,
    pub models: Vec<AssetRef>,
    pub textures: Vec<AssetRef>,
    pub animations: Vec<(String, AnimationSpec)>,
    #[serde(default)]
    pub sun: DirectionalLight,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_light: Option<PointLight>,
    pub items: Vec<SceneItem>,
}

impl SceneDescription {
    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN_SCENES.iter().map(|(name, _)| *name)
    }

    /// Resolves `scene` as a built-in name first, then as a path to an XML
    /// file.
    pub fn load(scene: &str) -> Result<Self> {
        if let Some((_, xml)) = BUILTIN_SCENES.iter().find(|(name, _)| *name == scene) {
            return Self::from_xml(xml).with_context(|| format!("built-in scene `{scene}`"));
        }
        let xml = fs::read_to_string(scene)
            .with_context(|| format!("failed to read scene file {scene}"))?;
        Self::from_xml(&xml).with_context(|| format!("failed to parse scene file {scene}"))
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        if !root.has_tag_name("scene") {
            bail!("root element must be <scene>, found <{}>", root.tag_name().name());
        }

        let mut scene = SceneDescription {
            name: root.attribute("name").unwrap_or("untitled").to_string(),
            clear_color: parse_color(root.attribute("clear"), Vec3::ZERO)?,
            camera: CameraStart::default(),
            models: Vec::new(),
            textures: Vec::new(),
            animations: Vec::new(),
            sun: DirectionalLight::default(),
            point_light: None,
            items: Vec::new(),
        };

        for node in root.children().filter(Node::is_element) {
            match node.tag_name().name() {
                "camera" => scene.camera = parse_camera(&node)?,
                "model" => scene.models.push(parse_asset(&node)?),
                "texture" => scene.textures.push(parse_asset(&node)?),
                "animation" => scene.animations.push(parse_animation(&node)?),
                "light" => match required_attr(&node, "kind")? {
                    "directional" => scene.sun = parse_directional(&node)?,
                    "point" => {
                        if scene.point_light.is_some() {
                            bail!("only one point light is supported");
                        }
                        scene.point_light = Some(parse_point(&node)?);
                    }
                    other => bail!("unknown light kind `{other}`"),
                },
                "item" => scene.items.push(parse_item(&node)?),
                other => bail!("unexpected <{other}> in scene"),
            }
        }

        scene.validate()?;
        Ok(scene)
    }

    /// Fresh oscillators for every declared animation.
    pub fn animations(&self) -> Animations {
        let mut animations = Animations::new();
        for (name, spec) in &self.animations {
            animations.insert(name.clone(), spec.oscillator());
        }
        animations
    }

    pub fn model_path(&self, assets: &Path, name: &str) -> Option<PathBuf> {
        self.models
            .iter()
            .find(|model| model.name == name)
            .map(|model| assets.join(&model.path))
    }

    fn validate(&self) -> Result<()> {
        let mut meshes: HashSet<&str> = BUILTIN_MESHES.into_iter().collect();
        for model in &self.models {
            if !meshes.insert(&model.name) {
                bail!("mesh `{}` is declared twice", model.name);
            }
        }
        let mut textures = HashSet::new();
        for texture in &self.textures {
            if !textures.insert(texture.name.as_str()) {
                bail!("texture `{}` is declared twice", texture.name);
            }
        }
        let mut animations = HashSet::new();
        for (name, _) in &self.animations {
            if !animations.insert(name.as_str()) {
                bail!("animation `{name}` is declared twice");
            }
        }
        let check_scalar = |scalar: &Scalar, context: &str| -> Result<()> {
            match scalar.animation() {
                Some(name) if !animations.contains(name) => {
                    bail!("{context} references unknown animation `@{name}`")
                }
                _ => Ok(()),
            }
        };

        for item in &self.items {
            if !meshes.contains(item.mesh.as_str()) {
                bail!("item `{}` uses unknown mesh `{}`", item.name, item.mesh);
            }
            if let Some(texture) = &item.texture {
                if !textures.contains(texture.as_str()) {
                    bail!("item `{}` uses unknown texture `{texture}`", item.name);
                }
            }
            for scalar in item.steps.iter().flat_map(TransformStep::scalars) {
                check_scalar(scalar, &format!("item `{}`", item.name))?;
            }
        }
        if let Some(light) = &self.point_light {
            for scalar in light.position.0.iter().chain([&light.intensity]) {
                check_scalar(scalar, "point light")?;
            }
        }
        Ok(())
    }
}

fn parse_camera(node: &Node<'_, '_>) -> Result<CameraStart> {
    let defaults = CameraStart::default();
    Ok(CameraStart {
        position: parse_vec3(node.attribute("position"), defaults.position)?,
        yaw: parse_f32(node.attribute("yaw"), defaults.yaw)?,
        pitch: parse_f32(node.attribute("pitch"), defaults.pitch)?,
    })
}

fn parse_asset(node: &Node<'_, '_>) -> Result<AssetRef> {
    Ok(AssetRef {
        name: required_attr(node, "name")?.to_string(),
        path: PathBuf::from(required_attr(node, "path")?),
    })
}

fn parse_animation(node: &Node<'_, '_>) -> Result<(String, AnimationSpec)> {
    let name = required_attr(node, "name")?.to_string();
    let min = parse_f32(Some(required_attr(node, "min")?), 0.0)?;
    let max = parse_f32(Some(required_attr(node, "max")?), 0.0)?;
    let spec = AnimationSpec {
        min,
        max,
        start: parse_f32(node.attribute("start"), min)?,
        speed: parse_f32(node.attribute("speed"), 1.0)?,
    };
    Ok((name, spec))
}

fn parse_directional(node: &Node<'_, '_>) -> Result<DirectionalLight> {
    let defaults = DirectionalLight::default();
    Ok(DirectionalLight {
        direction: parse_vec3(node.attribute("direction"), defaults.direction)?,
        color: parse_color(node.attribute("color"), defaults.color)?,
        ambient: parse_f32(node.attribute("ambient"), defaults.ambient)?,
        diffuse: parse_f32(node.attribute("diffuse"), defaults.diffuse)?,
        specular: parse_f32(node.attribute("specular"), defaults.specular)?,
    })
}

fn parse_point(node: &Node<'_, '_>) -> Result<PointLight> {
    Ok(PointLight {
        position: parse_vec3_expr(required_attr(node, "position")?, false)?,
        color: parse_color(node.attribute("color"), Vec3::ONE)?,
        intensity: match node.attribute("intensity") {
            Some(text) => parse_scalar(text)?,
            None => Scalar::Const(1.0),
        },
    })
}

fn parse_item(node: &Node<'_, '_>) -> Result<SceneItem> {
    let name = required_attr(node, "name")?.to_string();
    let defaults = Material::default();
    let depth = match node.attribute("depth") {
        None | Some("test") => DepthMode::Test,
        Some("ignore") => DepthMode::Ignore,
        Some(other) => bail!("item `{name}` has unknown depth mode `{other}`"),
    };

    let mut steps = Vec::new();
    for child in node.children().filter(Node::is_element) {
        let text = child.text().map(str::trim).unwrap_or_default();
        let step = match child.tag_name().name() {
            "translate" => TransformStep::Translate(parse_vec3_expr(text, false)?),
            "scale" => TransformStep::Scale(parse_vec3_expr(text, true)?),
            "rotate" => parse_rotate(text)?,
            other => bail!("item `{name}` has unknown transform <{other}>"),
        };
        steps.push(step);
    }

    Ok(SceneItem {
        mesh: required_attr(node, "mesh")?.to_string(),
        color: parse_color(node.attribute("color"), Vec3::ONE)
            .with_context(|| format!("item `{name}`"))?,
        group: node.attribute("group").map(str::to_string),
        depth,
        texture: node.attribute("texture").map(str::to_string),
        material: Material {
            shininess: parse_f32(node.attribute("shininess"), defaults.shininess)?,
            specular: parse_f32(node.attribute("specular"), defaults.specular)?,
        },
        steps,
        name,
    })
}

fn parse_rotate(text: &str) -> Result<TransformStep> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let [angle, x, y, z] = parts.as_slice() else {
        bail!("rotate needs `angle x y z`, got `{text}`");
    };
    Ok(TransformStep::Rotate {
        angle: parse_scalar(angle)?,
        axis: Vec3Expr([parse_scalar(x)?, parse_scalar(y)?, parse_scalar(z)?]),
    })
}

fn required_attr<'a>(node: &Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            anyhow!(
                "<{}> is missing the `{name}` attribute",
                node.tag_name().name()
            )
        })
}

fn parse_scalar(text: &str) -> Result<Scalar> {
    match text.strip_prefix('@') {
        Some(name) if !name.is_empty() => Ok(Scalar::Animated(name.to_string())),
        Some(_) => bail!("`@` must be followed by an animation name"),
        None => parse_number(text).map(Scalar::Const),
    }
}

/// Three components, or one when `allow_splat` is set.
fn parse_vec3_expr(text: &str, allow_splat: bool) -> Result<Vec3Expr> {
    let parts = text
        .split_whitespace()
        .map(parse_scalar)
        .collect::<Result<Vec<_>>>()?;
    match <[Scalar; 3]>::try_from(parts) {
        Ok(components) => Ok(Vec3Expr(components)),
        Err(parts) if allow_splat && parts.len() == 1 => {
            let s = parts[0].clone();
            Ok(Vec3Expr([s.clone(), s.clone(), s]))
        }
        Err(parts) => bail!("expected 3 components, found {} in `{text}`", parts.len()),
    }
}

fn parse_vec3(value: Option<&str>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split_whitespace()
        .map(parse_number)
        .collect::<Result<Vec<_>>>()?;
    match numbers.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => bail!("vector `{value}` needs 3 components"),
    }
}

/// `r g b` in 0..=255.
fn parse_color(value: Option<&str>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(text) => Ok(parse_vec3(Some(text), default)
            .context("color is malformed")?
            .clamp(Vec3::ZERO, Vec3::splat(255.0))
            / 255.0),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<&str>, default: f32) -> Result<f32> {
    match value {
        Some(value) => parse_number(value.trim()),
        None => Ok(default),
    }
}

/// Every number in a scene must be finite; `NaN` and `inf` are rejected.
fn parse_number(text: &str) -> Result<f32> {
    let value = text
        .parse::<f32>()
        .map_err(|err| anyhow!("failed to parse `{text}` as a number: {err}"))?;
    if !value.is_finite() {
        bail!("`{text}` is not a finite number");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <scene name="test" clear="255 0 0">
        <model name="tower" path="models/tower.obj"/>
        <animation name="tide" min="1" max="3" start="2" speed="1"/>
        <light kind="point" position="0 @tide 0" color="255 128 0" intensity="@tide"/>
        <item name="sea" mesh="cube" color="0 0 255">
            <translate>1 0 0</translate>
            <scale>2</scale>
        </item>
        <item name="cloud" mesh="cube" group="clouds" depth="ignore" shininess="8">
            <scale>1 @tide 1</scale>
        </item>
        <item name="tower" mesh="tower">
            <rotate>90 0 1 0</rotate>
        </item>
    </scene>
    "#;

    #[test]
    fn parses_items_and_assets() {
        let scene = SceneDescription::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.name, "test");
        assert_eq!(scene.clear_color, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(scene.items.len(), 3);
        assert_eq!(scene.models[0].path, PathBuf::from("models/tower.obj"));
        let cloud = &scene.items[1];
        assert!(cloud.is_cloud());
        assert_eq!(cloud.depth, DepthMode::Ignore);
        assert_eq!(cloud.material.shininess, 8.0);
        assert_eq!(scene.items[0].color, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(
            scene.model_path(Path::new("assets"), "tower"),
            Some(PathBuf::from("assets/models/tower.obj"))
        );
    }

    #[test]
    fn transform_steps_post_multiply_in_document_order() {
        let scene = SceneDescription::from_xml(SAMPLE).unwrap();
        let model = scene.items[0].model_matrix(&Animations::new());
        // scale applies to the vertex before the translation
        let moved = model.transform_point3(Vec3::X);
        assert!(moved.distance(Vec3::new(3.0, 0.0, 0.0)) < 1e-6);

        let tower = scene.items[2].model_matrix(&Animations::new());
        assert!(tower.transform_point3(Vec3::X).distance(Vec3::NEG_Z) < 1e-6);
    }

    #[test]
    fn animated_components_follow_oscillators() {
        let scene = SceneDescription::from_xml(SAMPLE).unwrap();
        let mut animations = scene.animations();
        let cloud = &scene.items[1];
        let before = cloud.model_matrix(&animations).transform_point3(Vec3::Y);
        assert!((before.y - 2.0).abs() < 1e-6);

        animations.advance(0.5);
        let after = cloud.model_matrix(&animations).transform_point3(Vec3::Y);
        assert!((after.y - 2.5).abs() < 1e-6);

        let light = scene.point_light.as_ref().unwrap().resolve(&animations);
        assert_eq!(light.intensity, 2.5);
        assert_eq!(light.position, Vec3::new(0.0, 2.5, 0.0));
    }

    #[test]
    fn unknown_references_are_errors() {
        let unknown_mesh = r#"<scene><item name="a" mesh="boat"/></scene>"#;
        assert!(SceneDescription::from_xml(unknown_mesh).is_err());

        let unknown_anim =
            r#"<scene><item name="a" mesh="cube"><scale>1 @wave 1</scale></item></scene>"#;
        let err = SceneDescription::from_xml(unknown_anim).unwrap_err();
        assert!(err.to_string().contains("@wave"));

        let unknown_texture = r#"<scene><item name="a" mesh="cube" texture="sand"/></scene>"#;
        assert!(SceneDescription::from_xml(unknown_texture).is_err());
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(SceneDescription::from_xml("<scene>").is_err());
        assert!(SceneDescription::from_xml("<world/>").is_err());
        assert!(SceneDescription::from_xml(r#"<scene><item mesh="cube"/></scene>"#).is_err());
        let bad_step = r#"<scene><item name="a" mesh="cube"><translate>1 2</translate></item></scene>"#;
        assert!(SceneDescription::from_xml(bad_step).is_err());
        let bad_depth = r#"<scene><item name="a" mesh="cube" depth="maybe"/></scene>"#;
        assert!(SceneDescription::from_xml(bad_depth).is_err());
    }

    #[test]
    fn non_finite_numbers_are_errors() {
        let nan_bound = r#"<scene><animation name="a" min="NaN" max="1"/></scene>"#;
        let err = SceneDescription::from_xml(nan_bound).unwrap_err();
        assert!(format!("{err:#}").contains("not a finite number"));

        let inf_speed = r#"<scene><animation name="a" min="0" max="1" speed="inf"/></scene>"#;
        assert!(SceneDescription::from_xml(inf_speed).is_err());

        let inf_step = r#"<scene><item name="a" mesh="cube"><scale>inf</scale></item></scene>"#;
        assert!(SceneDescription::from_xml(inf_step).is_err());
    }

    #[test]
    fn builtin_scenes_parse() {
        for name in SceneDescription::builtin_names() {
            let scene = SceneDescription::load(name).unwrap();
            assert!(!scene.items.is_empty(), "{name} has no items");
        }
        let caribbean = SceneDescription::load("caribbean").unwrap();
        assert!(caribbean.items.iter().any(|item| item.depth == DepthMode::Ignore));
        assert!(caribbean.items.iter().any(SceneItem::is_cloud));
        assert!(caribbean.point_light.is_some());
    }

    #[test]
    fn caribbean_lighthouse_is_only_translated() {
        let caribbean = SceneDescription::load("caribbean").unwrap();
        let lighthouse = caribbean
            .items
            .iter()
            .find(|item| item.name == "lighthouse")
            .unwrap();
        assert_eq!(lighthouse.steps.len(), 1);
        assert!(matches!(lighthouse.steps[0], TransformStep::Translate(_)));
    }
}
