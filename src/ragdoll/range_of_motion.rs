//! 关节活动范围

use bitflags::bitflags;
use glam::Vec3;

use crate::physics::{JointHandle, PhysicsSpace};

bitflags! {
    /// 需要锁定在当前角度的旋转轴
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AxisLock: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
        const ALL = Self::X.bits() | Self::Y.bits() | Self::Z.bits();
    }
}

/// 每轴旋转上下限（弧度）
///
/// 任一端为无穷表示该轴不受限。`Default` 不允许任何旋转。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RangeOfMotion {
    pub max_x: f32,
    pub min_x: f32,
    pub max_y: f32,
    pub min_y: f32,
    pub max_z: f32,
    pub min_z: f32,
}

impl RangeOfMotion {
    pub fn new(max_x: f32, min_x: f32, max_y: f32, min_y: f32, max_z: f32, min_z: f32) -> Self {
        Self { max_x, min_x, max_y, min_y, max_z, min_z }
    }

    /// 每轴对称的范围 `[-x, x]`
    pub fn symmetric(x: f32, y: f32, z: f32) -> Self {
        Self::new(x, -x, y, -y, z, -z)
    }

    /// 铰链：只允许绕 `axis` (0=X, 1=Y, 2=Z) 旋转
    pub fn hinge(axis: usize, min: f32, max: f32) -> Self {
        let mut rom = Self::default();
        match axis {
            0 => (rom.min_x, rom.max_x) = (min, max),
            1 => (rom.min_y, rom.max_y) = (min, max),
            _ => (rom.min_z, rom.max_z) = (min, max),
        }
        rom
    }

    /// 三轴都不受限
    pub fn free() -> Self {
        Self::symmetric(f32::INFINITY, f32::INFINITY, f32::INFINITY)
    }

    #[inline]
    pub fn lower(&self) -> Vec3 {
        Vec3::new(self.min_x, self.min_y, self.min_z)
    }

    #[inline]
    pub fn upper(&self) -> Vec3 {
        Vec3::new(self.max_x, self.max_y, self.max_z)
    }

    /// 把范围写入关节；`locks` 中的轴锁定在关节当前的角度
    pub fn setup_joint(&self, space: &mut PhysicsSpace, joint: &JointHandle, locks: AxisLock) {
        let mut lower = self.lower();
        let mut upper = self.upper();

        if !locks.is_empty() {
            let angles = space.joint_angles(joint);
            for (axis, flag) in [AxisLock::X, AxisLock::Y, AxisLock::Z].into_iter().enumerate() {
                if locks.contains(flag) {
                    lower[axis] = angles[axis];
                    upper[axis] = angles[axis];
                }
            }
        }

        space.set_joint_angular_limits(joint, lower, upper);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{EulerRot, Quat};

    use crate::math::coords::pivot_frames;
    use crate::math::Transform;
    use crate::physics::{BodyShape, PhysicsConfig, RigidBodyDesc, SixDofJoint};

    fn body(transform: Transform, mass: f32) -> RigidBodyDesc {
        RigidBodyDesc {
            shape: BodyShape::Ball { radius: 0.1 },
            mass,
            transform,
            kinematic: false,
            linear_damping: 0.0,
            angular_damping: 0.0,
            report_contacts: false,
        }
    }

    /// 子刚体绕枢轴转到 `pose` 后锁定全部三轴，模拟若干子步后返回姿态偏移（弧度）
    fn locked_drift(pose: Quat) -> f32 {
        let mut space = PhysicsSpace::with_config(&PhysicsConfig::default());
        let parent = space.add_rigid_body(&body(Transform::IDENTITY, 0.0));
        let child_start = Transform::from_translation(Vec3::new(0.0, -1.0, 0.0));
        let child = space.add_rigid_body(&body(child_start, 1.0));
        space.set_uniform_acceleration(child.id(), Vec3::ZERO);

        let pivot = Vec3::new(0.0, -0.5, 0.0);
        let frames = pivot_frames(pivot, &Transform::IDENTITY, &child_start);
        let joint = space.add_joint(parent.id(), child.id(), SixDofJoint::new(frames));

        let posed = Transform::from_rotation_translation(pose, pivot - pose * Vec3::new(0.0, 0.5, 0.0));
        space.set_physics_transform(child.id(), &posed);
        RangeOfMotion::free().setup_joint(&mut space, &joint, AxisLock::ALL);

        for _ in 0..120 {
            space.single_step(&mut ());
        }
        space.physics_transform(child.id()).rotation.angle_between(pose)
    }

    #[test]
    fn test_locked_axes_hold_single_axis_pose() {
        assert!(locked_drift(Quat::from_rotation_x(0.6)) < 0.01);
    }

    #[test]
    fn test_locked_axes_hold_multi_axis_pose() {
        assert!(locked_drift(Quat::from_euler(EulerRot::XYZ, 0.3, 0.2, 0.25)) < 0.01);
        assert!(locked_drift(Quat::from_euler(EulerRot::XYZ, 0.9, 0.7, 0.8)) < 0.01);
    }

    #[test]
    fn test_presets() {
        let rom = RangeOfMotion::default();
        assert_eq!(rom.lower(), Vec3::ZERO);
        assert_eq!(rom.upper(), Vec3::ZERO);

        let hinge = RangeOfMotion::hinge(0, -0.2, 1.5);
        assert!((hinge.min_x + 0.2).abs() < 1e-6);
        assert!((hinge.max_x - 1.5).abs() < 1e-6);
        assert_eq!(hinge.max_y, 0.0);

        let sym = RangeOfMotion::symmetric(0.5, 0.25, 1.0);
        assert!(sym.lower().abs_diff_eq(Vec3::new(-0.5, -0.25, -1.0), 1e-6));

        assert!(!RangeOfMotion::free().upper().is_finite());
    }

    #[test]
    fn test_axis_lock_flags() {
        let locks = AxisLock::X | AxisLock::Z;
        assert!(locks.contains(AxisLock::X));
        assert!(!locks.contains(AxisLock::Y));
        assert_eq!(AxisLock::ALL, AxisLock::X | AxisLock::Y | AxisLock::Z);
    }
}
