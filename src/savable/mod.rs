//! 胶囊式二进制序列化
//!
//! 每个字段按 `名称长度(u16) + 名称(UTF-8) + 类型标记(u8) + 数据` 写出，全部小端。
//! 读取时先把整个缓冲区解析为“名称 -> 字段”的映射，字段缺失时返回调用方给出的默认值，
//! 所以字段的增删不会破坏旧数据。

use std::collections::HashMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Quat, Vec3};

use crate::math::Transform;
use crate::{RagdollError, Result};

const TAG_BOOL: u8 = 1;
const TAG_I32: u8 = 2;
const TAG_F32: u8 = 3;
const TAG_VEC3: u8 = 4;
const TAG_QUAT: u8 = 5;
const TAG_STRING: u8 = 6;
const TAG_SAVABLE: u8 = 7;
const TAG_SAVABLE_ARRAY: u8 = 8;

/// 可写入胶囊的类型
pub trait Savable: Sized {
    fn write(&self, capsule: &mut OutputCapsule) -> Result<()>;
    fn read(capsule: &InputCapsule) -> Result<Self>;
}

/// 序列化为字节
pub fn to_bytes<T: Savable>(value: &T) -> Result<Vec<u8>> {
    let mut capsule = OutputCapsule::new();
    value.write(&mut capsule)?;
    Ok(capsule.into_bytes())
}

/// 从字节反序列化
pub fn from_bytes<T: Savable>(bytes: &[u8]) -> Result<T> {
    T::read(&InputCapsule::from_bytes(bytes)?)
}

// ========================================
// 写
// ========================================

/// 输出胶囊
#[derive(Debug, Default)]
pub struct OutputCapsule {
    buffer: Vec<u8>,
}

impl OutputCapsule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn write_header(&mut self, name: &str, tag: u8) -> Result<()> {
        let len = u16::try_from(name.len())
            .map_err(|_| RagdollError::InvalidArgument(format!("字段名过长: {}", name)))?;
        self.buffer.write_u16::<LittleEndian>(len)?;
        self.buffer.extend_from_slice(name.as_bytes());
        self.buffer.write_u8(tag)?;
        Ok(())
    }

    fn write_block(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| RagdollError::InvalidArgument("数据块过大".to_string()))?;
        self.buffer.write_u32::<LittleEndian>(len)?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_bool(&mut self, name: &str, value: bool) -> Result<()> {
        self.write_header(name, TAG_BOOL)?;
        self.buffer.write_u8(value as u8)?;
        Ok(())
    }

    pub fn write_i32(&mut self, name: &str, value: i32) -> Result<()> {
        self.write_header(name, TAG_I32)?;
        self.buffer.write_i32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_f32(&mut self, name: &str, value: f32) -> Result<()> {
        self.write_header(name, TAG_F32)?;
        self.buffer.write_f32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_vec3(&mut self, name: &str, value: Vec3) -> Result<()> {
        self.write_header(name, TAG_VEC3)?;
        for c in value.to_array() {
            self.buffer.write_f32::<LittleEndian>(c)?;
        }
        Ok(())
    }

    pub fn write_quat(&mut self, name: &str, value: Quat) -> Result<()> {
        self.write_header(name, TAG_QUAT)?;
        for c in value.to_array() {
            self.buffer.write_f32::<LittleEndian>(c)?;
        }
        Ok(())
    }

    pub fn write_string(&mut self, name: &str, value: &str) -> Result<()> {
        self.write_header(name, TAG_STRING)?;
        self.write_block(value.as_bytes())
    }

    /// 嵌套写入
    pub fn write_savable<T: Savable>(&mut self, name: &str, value: &T) -> Result<()> {
        let bytes = to_bytes(value)?;
        self.write_header(name, TAG_SAVABLE)?;
        self.write_block(&bytes)
    }

    /// `None` 不写出，读取时按缺失处理
    pub fn write_optional<T: Savable>(&mut self, name: &str, value: Option<&T>) -> Result<()> {
        match value {
            Some(v) => self.write_savable(name, v),
            None => Ok(()),
        }
    }

    pub fn write_savable_array<T: Savable>(&mut self, name: &str, values: &[T]) -> Result<()> {
        let mut blocks = Vec::with_capacity(values.len());
        for value in values {
            blocks.push(to_bytes(value)?);
        }
        self.write_header(name, TAG_SAVABLE_ARRAY)?;
        self.buffer.write_u32::<LittleEndian>(blocks.len() as u32)?;
        for block in &blocks {
            self.write_block(block)?;
        }
        Ok(())
    }
}

// ========================================
// 读
// ========================================

#[derive(Debug, Clone)]
struct Field {
    tag: u8,
    data: Vec<u8>,
}

/// 输入胶囊
#[derive(Debug, Default)]
pub struct InputCapsule {
    fields: HashMap<String, Field>,
}

impl InputCapsule {
    /// 解析整个缓冲区
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(bytes);
        let mut fields = HashMap::new();

        while (reader.position() as usize) < bytes.len() {
            let name_len = reader.read_u16::<LittleEndian>()? as usize;
            let name = read_exact(&mut reader, name_len)?;
            let name = String::from_utf8(name)
                .map_err(|e| RagdollError::Capsule(format!("字段名不是 UTF-8: {}", e)))?;
            let tag = reader.read_u8()?;

            let data = match tag {
                TAG_BOOL => read_exact(&mut reader, 1)?,
                TAG_I32 | TAG_F32 => read_exact(&mut reader, 4)?,
                TAG_VEC3 => read_exact(&mut reader, 12)?,
                TAG_QUAT => read_exact(&mut reader, 16)?,
                TAG_STRING | TAG_SAVABLE => {
                    let len = reader.read_u32::<LittleEndian>()? as usize;
                    read_exact(&mut reader, len)?
                }
                TAG_SAVABLE_ARRAY => {
                    // 保留计数与各块的长度前缀，读取时再拆分
                    let start = reader.position() as usize;
                    let count = reader.read_u32::<LittleEndian>()?;
                    for _ in 0..count {
                        let len = reader.read_u32::<LittleEndian>()? as u64;
                        reader.set_position(reader.position() + len);
                    }
                    let end = reader.position() as usize;
                    if end > bytes.len() {
                        return Err(RagdollError::Capsule(format!("数组字段越界: {}", name)));
                    }
                    bytes[start..end].to_vec()
                }
                other => {
                    return Err(RagdollError::Capsule(format!("未知类型标记 {} (字段 {})", other, name)));
                }
            };

            fields.insert(name, Field { tag, data });
        }

        Ok(Self { fields })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn field(&self, name: &str, tag: u8) -> Result<Option<&Field>> {
        match self.fields.get(name) {
            Some(field) if field.tag == tag => Ok(Some(field)),
            Some(field) => Err(RagdollError::Capsule(format!(
                "字段 {} 类型不符: 期望 {}, 实际 {}",
                name, tag, field.tag
            ))),
            None => Ok(None),
        }
    }

    pub fn read_bool(&self, name: &str, default: bool) -> Result<bool> {
        Ok(match self.field(name, TAG_BOOL)? {
            Some(f) => f.data[0] != 0,
            None => default,
        })
    }

    pub fn read_i32(&self, name: &str, default: i32) -> Result<i32> {
        match self.field(name, TAG_I32)? {
            Some(f) => Ok(Cursor::new(&f.data).read_i32::<LittleEndian>()?),
            None => Ok(default),
        }
    }

    pub fn read_f32(&self, name: &str, default: f32) -> Result<f32> {
        match self.field(name, TAG_F32)? {
            Some(f) => Ok(Cursor::new(&f.data).read_f32::<LittleEndian>()?),
            None => Ok(default),
        }
    }

    pub fn read_vec3(&self, name: &str, default: Vec3) -> Result<Vec3> {
        match self.field(name, TAG_VEC3)? {
            Some(f) => {
                let mut reader = Cursor::new(&f.data);
                let x = reader.read_f32::<LittleEndian>()?;
                let y = reader.read_f32::<LittleEndian>()?;
                let z = reader.read_f32::<LittleEndian>()?;
                Ok(Vec3::new(x, y, z))
            }
            None => Ok(default),
        }
    }

    pub fn read_quat(&self, name: &str, default: Quat) -> Result<Quat> {
        match self.field(name, TAG_QUAT)? {
            Some(f) => {
                let mut reader = Cursor::new(&f.data);
                let x = reader.read_f32::<LittleEndian>()?;
                let y = reader.read_f32::<LittleEndian>()?;
                let z = reader.read_f32::<LittleEndian>()?;
                let w = reader.read_f32::<LittleEndian>()?;
                Ok(Quat::from_xyzw(x, y, z, w))
            }
            None => Ok(default),
        }
    }

    pub fn read_string(&self, name: &str) -> Result<Option<String>> {
        match self.field(name, TAG_STRING)? {
            Some(f) => String::from_utf8(f.data.clone())
                .map(Some)
                .map_err(|e| RagdollError::Capsule(format!("字段 {} 不是 UTF-8: {}", name, e))),
            None => Ok(None),
        }
    }

    pub fn read_savable<T: Savable>(&self, name: &str) -> Result<Option<T>> {
        match self.field(name, TAG_SAVABLE)? {
            Some(f) => from_bytes(&f.data).map(Some),
            None => Ok(None),
        }
    }

    /// 必需字段
    pub fn require_savable<T: Savable>(&self, name: &str) -> Result<T> {
        self.read_savable(name)?
            .ok_or_else(|| RagdollError::MissingField(name.to_string()))
    }

    pub fn read_savable_array<T: Savable>(&self, name: &str) -> Result<Vec<T>> {
        let Some(f) = self.field(name, TAG_SAVABLE_ARRAY)? else {
            return Ok(Vec::new());
        };

        let mut reader = Cursor::new(&f.data);
        let count = reader.read_u32::<LittleEndian>()?;
        let mut values = Vec::with_capacity((count as usize).min(f.data.len() / 4));
        for _ in 0..count {
            let len = reader.read_u32::<LittleEndian>()? as usize;
            let block = read_exact(&mut reader, len)?;
            values.push(from_bytes(&block)?);
        }
        Ok(values)
    }
}

/// 读取 `len` 字节；长度先与剩余数据比较，不为损坏的长度前缀分配内存
fn read_exact<T: AsRef<[u8]>>(reader: &mut Cursor<T>, len: usize) -> Result<Vec<u8>> {
    let remaining = (reader.get_ref().as_ref().len() as u64).saturating_sub(reader.position());
    if len as u64 > remaining {
        return Err(RagdollError::Capsule(format!("块长度 {} 超出剩余数据 {}", len, remaining)));
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    Ok(data)
}

impl Savable for Transform {
    fn write(&self, capsule: &mut OutputCapsule) -> Result<()> {
        capsule.write_vec3("translation", self.translation)?;
        capsule.write_quat("rotation", self.rotation)?;
        capsule.write_vec3("scale", self.scale)
    }

    fn read(capsule: &InputCapsule) -> Result<Self> {
        Ok(Transform::new(
            capsule.read_vec3("translation", Vec3::ZERO)?,
            capsule.read_quat("rotation", Quat::IDENTITY)?,
            capsule.read_vec3("scale", Vec3::ONE)?,
        ))
    }
}
