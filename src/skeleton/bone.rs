//! 骨骼节点
//!
//! 每个 `Bone` 记录自身的绑定姿态、当前局部变换，以及由父骨骼累积得到的
//! mesh 空间（model-space）变换。

use crate::math::Transform;

/// 骨骼节点
///
/// - 静态数据：名称、父子关系、绑定姿态（初始化后不变）
/// - 动态数据：局部变换、mesh 空间变换、用户控制标志（每帧更新）
#[derive(Clone, Debug)]
pub struct Bone {
    // ========================================
    // 静态数据
    // ========================================

    /// 骨骼名称
    pub name: String,

    /// 骨骼索引
    pub(crate) index: usize,

    /// 父骨骼索引（根骨骼为 None）
    pub parent: Option<usize>,

    /// 子骨骼索引
    pub children: Vec<usize>,

    /// 绑定姿态（相对父骨骼）
    pub bind: Transform,

    // ========================================
    // 动态数据
    // ========================================

    /// 局部变换 (local_to_parent)
    pub local: Transform,

    /// mesh 空间变换 (local_to_mesh)
    pub model: Transform,

    /// 为 true 时动画系统不再写入该骨骼，由链接直接控制
    pub user_control: bool,
}

impl Bone {
    pub fn new(name: impl Into<String>, bind: Transform) -> Self {
        Self {
            name: name.into(),
            index: 0,
            parent: None,
            children: Vec::new(),
            bind,
            local: bind,
            model: bind,
            user_control: false,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// mesh 空间位置
    #[inline]
    pub fn model_position(&self) -> glam::Vec3 {
        self.model.translation
    }

    /// 恢复绑定姿态
    #[inline]
    pub fn reset_to_bind(&mut self) {
        self.local = self.bind;
    }
}
