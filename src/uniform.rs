use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scalar, vector and matrix types a shader uniform can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformType {
    F32,
    I32,
    U32,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformType {
    /// Alignment in the WGSL uniform address space.
    pub const fn align(self) -> usize {
        match self {
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::Vec2 => 8,
            Self::Vec3 | Self::Vec4 | Self::Mat3 | Self::Mat4 => 16,
        }
    }

    /// Size in bytes, excluding trailing padding.
    pub const fn size(self) -> usize {
        match self {
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            // three columns, each padded to a vec4
            Self::Mat3 => 48,
            Self::Mat4 => 64,
        }
    }
}

/// A value that can be written into a [`UniformBlock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    F32(f32),
    I32(i32),
    U32(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            Self::F32(_) => UniformType::F32,
            Self::I32(_) => UniformType::I32,
            Self::U32(_) => UniformType::U32,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Mat3(_) => UniformType::Mat3,
            Self::Mat4(_) => UniformType::Mat4,
        }
    }

    fn write(&self, dst: &mut [u8]) {
        match self {
            Self::F32(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            Self::I32(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            Self::U32(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Vec2(v) => dst.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            Self::Vec3(v) => dst.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            Self::Vec4(v) => dst.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            Self::Mat3(m) => {
                let padded = [
                    m.x_axis.extend(0.0).to_array(),
                    m.y_axis.extend(0.0).to_array(),
                    m.z_axis.extend(0.0).to_array(),
                ];
                dst.copy_from_slice(bytemuck::cast_slice(&padded));
            }
            Self::Mat4(m) => dst.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array())),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::F32(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<u32> for UniformValue {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        Self::U32(value as u32)
    }
}

impl From<Vec2> for UniformValue {
    fn from(value: Vec2) -> Self {
        Self::Vec2(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        Self::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        Self::Vec4(value)
    }
}

impl From<Mat3> for UniformValue {
    fn from(value: Mat3) -> Self {
        Self::Mat3(value)
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        Self::Mat4(value)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UniformError {
    #[error("no uniform named `{name}` in program `{program}`")]
    Unknown { program: &'static str, name: String },
    #[error("uniform `{name}` is declared as {expected:?} but was given {found:?}")]
    TypeMismatch {
        name: String,
        expected: UniformType,
        found: UniformType,
    },
}

/// A named member of a uniform struct and its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    pub name: &'static str,
    pub ty: UniformType,
    pub offset: usize,
}

/// Member layout of one WGSL uniform struct.
///
/// Offsets follow the uniform address space rules, so the struct declared in
/// the shader with the same members in the same order lines up byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    label: &'static str,
    fields: Vec<UniformField>,
    size: usize,
}

impl UniformLayout {
    pub fn new(label: &'static str, members: &[(&'static str, UniformType)]) -> Self {
        let mut offset = 0;
        let mut fields = Vec::with_capacity(members.len());
        for &(name, ty) in members {
            offset = align_to(offset, ty.align());
            fields.push(UniformField { name, ty, offset });
            offset += ty.size();
        }
        // uniform structs are always 16-byte aligned
        let size = align_to(offset.max(1), 16);
        Self {
            label,
            fields,
            size,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// CPU copy of a uniform struct, addressed by member name.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    layout: Arc<UniformLayout>,
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(layout: Arc<UniformLayout>) -> Self {
        let bytes = vec![0; layout.size()];
        Self { layout, bytes }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layout.field(name).is_some()
    }

    pub fn set(&mut self, name: &str, value: impl Into<UniformValue>) -> Result<(), UniformError> {
        let value = value.into();
        let field = self
            .layout
            .field(name)
            .ok_or_else(|| UniformError::Unknown {
                program: self.layout.label(),
                name: name.to_string(),
            })?;
        if field.ty != value.ty() {
            return Err(UniformError::TypeMismatch {
                name: name.to_string(),
                expected: field.ty,
                found: value.ty(),
            });
        }
        let range = field.offset..field.offset + field.ty.size();
        value.write(&mut self.bytes[range]);
        Ok(())
    }

    /// Reads back an `f32` member; mostly useful for inspection and tests.
    pub fn get_f32(&self, name: &str) -> Option<f32> {
        let field = self.layout.field(name)?;
        (field.ty == UniformType::F32).then(|| {
            bytemuck::pod_read_unaligned(&self.bytes[field.offset..field.offset + 4])
        })
    }

    /// Reads back the raw floats of a vector or matrix member.
    pub fn get_floats(&self, name: &str) -> Option<Vec<f32>> {
        let field = self.layout.field(name)?;
        let range = field.offset..field.offset + field.ty.size();
        Some(
            self.bytes[range]
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect(),
        )
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub(crate) const fn align_to(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) / alignment * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Arc<UniformLayout> {
        Arc::new(UniformLayout::new(
            "test",
            &[
                ("model", UniformType::Mat4),
                ("normal_matrix", UniformType::Mat3),
                ("color", UniformType::Vec3),
                ("shininess", UniformType::F32),
                ("uv_scale", UniformType::Vec2),
                ("use_texture", UniformType::U32),
            ],
        ))
    }

    #[test]
    fn offsets_follow_uniform_alignment() {
        let layout = layout();
        let offsets: Vec<_> = layout.fields().iter().map(|f| f.offset).collect();
        // vec3 leaves a 4 byte tail that the following f32 packs into
        assert_eq!(offsets, vec![0, 64, 112, 124, 128, 136]);
        assert_eq!(layout.size(), 144);
    }

    #[test]
    fn set_writes_at_field_offset() {
        let mut block = UniformBlock::new(layout());
        block.set("shininess", 32.0).unwrap();
        block.set("color", Vec3::new(1.0, 0.5, 0.25)).unwrap();
        assert_eq!(block.get_f32("shininess"), Some(32.0));
        assert_eq!(block.get_floats("color").unwrap(), vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn mat3_columns_are_padded() {
        let mut block = UniformBlock::new(layout());
        block.set("normal_matrix", Mat3::IDENTITY).unwrap();
        let floats = block.get_floats("normal_matrix").unwrap();
        assert_eq!(
            floats,
            vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn rejects_unknown_names_and_wrong_types() {
        let mut block = UniformBlock::new(layout());
        assert!(matches!(
            block.set("missing", 1.0),
            Err(UniformError::Unknown { .. })
        ));
        assert_eq!(
            block.set("color", 1.0),
            Err(UniformError::TypeMismatch {
                name: "color".into(),
                expected: UniformType::Vec3,
                found: UniformType::F32,
            })
        );
    }
}
