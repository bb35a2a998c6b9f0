//! 变换数学
//!
//! `Transform` 是平移/旋转/缩放三元组，语义与场景图中的 TRS 一致：
//! 先缩放，再旋转，最后平移。

pub mod coords;

use glam::{Mat4, Quat, Vec3};

/// 平移 + 旋转 + 缩放
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[inline]
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { translation, rotation, scale }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::IDENTITY }
    }

    #[inline]
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self { translation, rotation, scale: Vec3::ONE }
    }

    /// 转换为 4x4 矩阵
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// 从矩阵分解
    #[inline]
    pub fn from_matrix(m: Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self { translation, rotation, scale }
    }

    /// 把本变换视为 `parent` 坐标系下的局部变换，返回其在 `parent` 的父坐标系中的表示
    ///
    /// result = parent * self
    pub fn combine_with_parent(&self, parent: &Transform) -> Transform {
        Transform {
            translation: parent.rotation * (self.translation * parent.scale) + parent.translation,
            rotation: (parent.rotation * self.rotation).normalize(),
            scale: self.scale * parent.scale,
        }
    }

    /// 逆变换（缩放分量为 0 时按 0 处理）
    pub fn invert(&self) -> Transform {
        let inv_rotation = self.rotation.inverse();
        let inv_scale = recip_or_zero(self.scale);
        Transform {
            translation: (inv_rotation * -self.translation) * inv_scale,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// 局部点 → 父坐标系
    #[inline]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation * (v * self.scale) + self.translation
    }

    /// 父坐标系点 → 局部
    #[inline]
    pub fn transform_inverse_vector(&self, v: Vec3) -> Vec3 {
        (self.rotation.inverse() * (v - self.translation)) * recip_or_zero(self.scale)
    }

    /// 把缩放统一设为 `s`
    #[inline]
    pub fn with_uniform_scale(mut self, s: f32) -> Transform {
        self.scale = Vec3::splat(s);
        self
    }

    /// 在 `start` 和 `end` 之间插值
    ///
    /// 平移和缩放线性插值，旋转球面插值。若两个旋转点积为负，
    /// 先对 `end` 的四元数取反，保证走最短路径。
    pub fn blend(weight: f32, start: &Transform, end: &Transform) -> Transform {
        let end_rotation = shortest_path(start.rotation, end.rotation);
        Transform {
            translation: start.translation.lerp(end.translation, weight),
            rotation: start.rotation.slerp(end_rotation, weight).normalize(),
            scale: start.scale.lerp(end.scale, weight),
        }
    }

    /// 各分量都在 `eps` 以内（旋转按四元数双覆盖比较）
    pub fn abs_diff_eq(&self, other: &Transform, eps: f32) -> bool {
        self.translation.abs_diff_eq(other.translation, eps)
            && self.scale.abs_diff_eq(other.scale, eps)
            && (self.rotation.abs_diff_eq(other.rotation, eps)
                || self.rotation.abs_diff_eq(-other.rotation, eps))
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite() && self.scale.is_finite()
    }
}

/// `end` 与 `start` 点积为负时返回 `-end`
#[inline]
pub fn shortest_path(start: Quat, end: Quat) -> Quat {
    if start.dot(end) < 0.0 {
        -end
    } else {
        end
    }
}

#[inline]
fn recip_or_zero(v: Vec3) -> Vec3 {
    Vec3::new(
        if v.x != 0.0 { 1.0 / v.x } else { 0.0 },
        if v.y != 0.0 { 1.0 / v.y } else { 0.0 },
        if v.z != 0.0 { 1.0 / v.z } else { 0.0 },
    )
}
