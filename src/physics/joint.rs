//! 6 自由度关节描述
//!
//! 对应 Bullet 的 btGeneric6DofConstraint：平移三轴锁死，
//! 旋转三轴按每轴上下限约束。下限大于上限（或任一端为无穷）表示该轴完全自由。
//! 构建时转换为 Rapier 的 GenericJoint。

use glam::{Quat, Vec3};
use rapier3d::prelude::*;

use crate::math::coords::JointFrames;

use super::space::to_isometry;

/// 6DOF 关节
#[derive(Clone, Debug)]
pub struct SixDofJoint {
    /// 两端局部坐标系
    pub frames: JointFrames,
    /// 旋转下限 (弧度)
    pub angular_lower: Vec3,
    /// 旋转上限 (弧度)
    pub angular_upper: Vec3,
    /// 是否允许两端刚体互相碰撞
    pub collision_between_linked_bodies: bool,
}

impl SixDofJoint {
    /// 新建关节：平移锁死，旋转自由
    pub fn new(frames: JointFrames) -> Self {
        Self {
            frames,
            angular_lower: Vec3::ONE,
            angular_upper: -Vec3::ONE,
            collision_between_linked_bodies: true,
        }
    }

    pub fn set_angular_limits(&mut self, lower: Vec3, upper: Vec3) {
        self.angular_lower = lower;
        self.angular_upper = upper;
    }

    /// 某轴是否受限
    #[inline]
    pub fn is_limited(&self, axis: usize) -> bool {
        axis_limited(self.angular_lower[axis], self.angular_upper[axis])
    }

    /// 创建 Rapier GenericJoint
    pub(crate) fn build(&self) -> GenericJoint {
        let frame1 = to_isometry(self.frames.pivot_parent, self.frames.rotation_parent);
        let frame2 = to_isometry(self.frames.pivot_child, self.frames.rotation_child);

        let mut joint = GenericJointBuilder::new(JointAxesMask::LIN_AXES)
            .local_frame1(frame1)
            .local_frame2(frame2)
            .contacts_enabled(self.collision_between_linked_bodies)
            .build();
        apply_angular_limits(&mut joint, self.angular_lower, self.angular_upper);
        joint
    }
}

#[inline]
fn axis_limited(lower: f32, upper: f32) -> bool {
    lower.is_finite() && upper.is_finite() && lower <= upper
}

/// 把旋转上下限写入 GenericJoint（不受限的轴清除限制）
pub(crate) fn apply_angular_limits(joint: &mut GenericJoint, lower: Vec3, upper: Vec3) {
    const AXES: [(JointAxis, JointAxesMask); 3] = [
        (JointAxis::AngX, JointAxesMask::ANG_X),
        (JointAxis::AngY, JointAxesMask::ANG_Y),
        (JointAxis::AngZ, JointAxesMask::ANG_Z),
    ];

    for (i, (axis, mask)) in AXES.iter().enumerate() {
        if axis_limited(lower[i], upper[i]) {
            joint.set_limits(*axis, [lower[i], upper[i]]);
        } else {
            joint.limit_axes.remove(*mask);
        }
    }
}

/// 关节两端坐标系之间的相对转角
///
/// 与 Rapier 的角度限制同一度量：相对四元数取 w >= 0 的一支，每轴角度为 `2·asin(虚部)`。
/// 以此作为上下限锁定时，关节保持当前姿态不动。
pub(crate) fn relative_angles(parent_rotation: Quat, child_rotation: Quat, frames: &JointFrames) -> Vec3 {
    let frame1 = parent_rotation * frames.rotation_parent;
    let frame2 = child_rotation * frames.rotation_child;
    let mut q = frame1.inverse() * frame2;
    if q.w < 0.0 {
        q = -q;
    }
    let imag = Vec3::new(q.x, q.y, q.z).clamp(Vec3::splat(-1.0), Vec3::ONE);
    Vec3::new(imag.x.asin(), imag.y.asin(), imag.z.asin()) * 2.0
}
