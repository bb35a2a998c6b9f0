//! 物理模块
//!
//! - `config`: 全局物理参数
//! - `joint`: 6DOF 关节描述
//! - `space`: Rapier3D 物理空间与刚体/关节句柄

pub mod config;
mod joint;
mod space;

pub use config::{get_config, reset_config, set_config, PhysicsConfig};
pub use joint::SixDofJoint;
pub use space::{
    BodyHandle, BodyId, BodyShape, ContactEvent, JointHandle, PhysicsSpace, PhysicsTickListener,
    RigidBodyDesc,
};
