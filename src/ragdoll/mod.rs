//! 布娃娃
//!
//! `DynamicAnimControl` 持有整棵链接树（躯干 → 骨骼链接 → 附件），
//! 每帧把 `update` 分发给所有链接，并在物理步进前同步运动学刚体。

mod attachment_link;
mod bone_link;
mod control;
mod link;
mod range_of_motion;
mod submode;
mod torso_link;

#[cfg(test)]
pub(crate) mod test_rig;

use glam::Vec3;

pub use attachment_link::AttachmentLink;
pub use bone_link::BoneLink;
pub use control::{DynamicAnimControl, RagdollCollisionListener, RagdollContext, RagdollTicker, TORSO_NAME};
pub use link::{LinkId, LinkKind, LinkMode, LinkState, PhysicsLink};
pub use range_of_motion::{AxisLock, RangeOfMotion};
pub use submode::KinematicSubmode;
pub use torso_link::TorsoLink;

use crate::physics::BodyShape;
use crate::scene::NodeId;

/// 链接配置（构建前设置）
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub range_of_motion: RangeOfMotion,
    pub mass: f32,
    pub shape: BodyShape,
    /// 刚体中心在骨骼局部坐标中的位置；`None` 取到第一个子骨骼的中点，叶子骨骼为原点
    pub offset: Option<Vec3>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            range_of_motion: RangeOfMotion::default(),
            mass: 1.0,
            shape: BodyShape::Ball { radius: 0.1 },
            offset: None,
        }
    }
}

impl LinkConfig {
    pub fn new(mass: f32, shape: BodyShape, range_of_motion: RangeOfMotion) -> Self {
        Self { range_of_motion, mass, shape, offset: None }
    }

    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// 附件配置
#[derive(Debug, Clone)]
pub struct AttachmentConfig {
    /// 挂接的骨骼名
    pub bone: String,
    /// 附件节点，其局部变换相对骨骼的 mesh 变换
    pub node: NodeId,
    pub mass: f32,
    pub shape: BodyShape,
    pub offset: Vec3,
}

impl AttachmentConfig {
    pub fn new(bone: &str, node: NodeId, mass: f32, shape: BodyShape) -> Self {
        Self { bone: bone.to_string(), node, mass, shape, offset: Vec3::ZERO }
    }
}
