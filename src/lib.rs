//! 骨骼布娃娃运行时
//!
//! 把动画骨骼与 Rapier3D 刚体世界绑定，并在每个链接（link）上
//! 于运动学（动画驱动）与动力学（物理驱动）之间平滑过渡。
//!
//! 模块划分：
//! - `math`: 变换与坐标系转换
//! - `skeleton`: 骨骼树（动画姿态来源）
//! - `scene`: 极简场景图（模型/附件的空间变换）
//! - `animation`: 关键帧姿态轨道
//! - `physics`: 物理配置与 Rapier 物理空间
//! - `ragdoll`: 链接状态机与 DynamicAnimControl
//! - `savable`: 胶囊式二进制序列化

pub mod animation;
pub mod error;
pub mod math;
pub mod physics;
pub mod ragdoll;
pub mod savable;
pub mod scene;
pub mod skeleton;

pub use error::{RagdollError, Result};
pub use math::Transform;
pub use physics::{BodyShape, PhysicsConfig, PhysicsSpace};
pub use ragdoll::{
    AttachmentConfig, AxisLock, DynamicAnimControl, KinematicSubmode, LinkConfig, LinkId, LinkMode,
    PhysicsLink, RagdollContext, RangeOfMotion,
};
pub use scene::{NodeId, SceneGraph};
pub use skeleton::Skeleton;
