//! 骨骼系统
//!
//! 核心设计思想：
//! - Bone: 单个骨骼节点（绑定姿态 + 局部变换 + mesh 空间变换）
//! - Skeleton: 管理骨骼层次结构，按前序存放
//!
//! 布娃娃链接把这里当作外部的动画姿态来源：读写骨骼局部变换，
//! 再由 Skeleton 刷新 mesh 空间变换。

mod bone;
#[allow(clippy::module_inception)]
mod skeleton;

pub use bone::Bone;
pub use skeleton::Skeleton;
