//! 坐标系转换
//!
//! 涉及的坐标系：
//! - 骨骼局部：相对父骨骼
//! - 网格（mesh）：动画几何体的局部坐标，骨骼的 model-space 变换就在这里
//! - 模型：受控模型根节点的局部坐标
//! - 世界/物理：刚体所在的坐标系
//!
//! 全部是无状态的纯函数，链接（link）在每帧的动力学/运动学更新中调用。

use glam::{Quat, Vec3};

use super::Transform;

/// 关节两端的局部坐标系
#[derive(Clone, Copy, Debug)]
pub struct JointFrames {
    /// 枢轴点在父刚体坐标系中的位置
    pub pivot_parent: Vec3,
    /// 枢轴点在子刚体坐标系中的位置
    pub pivot_child: Vec3,
    /// 关节坐标系相对父刚体的旋转（= 子刚体相对父刚体的旋转）
    pub rotation_parent: Quat,
    /// 关节坐标系相对子刚体的旋转
    pub rotation_child: Quat,
}

/// 刚体的物理变换：局部偏移 → 骨骼 mesh 变换 → mesh 世界变换
pub fn physics_from_bone(local_offset: Vec3, bone_mesh: &Transform, mesh_to_world: &Transform) -> Transform {
    Transform::from_translation(local_offset)
        .combine_with_parent(bone_mesh)
        .combine_with_parent(mesh_to_world)
}

/// 附件刚体的物理变换：局部偏移 → 附件模型局部变换 → 骨骼 mesh 变换 → mesh 世界变换
pub fn attachment_physics(
    local_offset: Vec3,
    attached_local: &Transform,
    bone_mesh: &Transform,
    mesh_to_world: &Transform,
) -> Transform {
    Transform::from_translation(local_offset)
        .combine_with_parent(attached_local)
        .combine_with_parent(bone_mesh)
        .combine_with_parent(mesh_to_world)
}

/// 物理变换 → 骨骼局部变换
///
/// 1. 世界 → mesh
/// 2. 扣除父骨骼的 mesh 变换（先减平移，再除缩放，最后反旋转）
/// 3. 扣除按结果旋转、缩放后的刚体局部偏移
pub fn bone_local_from_physics(
    physics: &Transform,
    mesh_to_world: &Transform,
    parent_bone_mesh: &Transform,
    local_offset: Vec3,
) -> Transform {
    let mut result = physics.combine_with_parent(&mesh_to_world.invert());

    let parent_rot_inv = parent_bone_mesh.rotation.inverse();
    let parent_scale_inv = parent_bone_mesh.invert().scale;
    result.translation = parent_rot_inv * ((result.translation - parent_bone_mesh.translation) * parent_scale_inv);
    result.scale *= parent_scale_inv;
    result.rotation = (parent_rot_inv * result.rotation).normalize();

    subtract_offset(&mut result, local_offset);
    result
}

/// 物理变换 → mesh 坐标（躯干根骨骼用）
pub fn mesh_from_physics(physics: &Transform, mesh_to_world: &Transform, local_offset: Vec3) -> Transform {
    let mut result = physics.combine_with_parent(&mesh_to_world.invert());
    subtract_offset(&mut result, local_offset);
    result
}

/// 物理变换 → 附件模型相对所属骨骼的局部变换
pub fn model_local_from_physics(
    physics: &Transform,
    mesh_to_world: &Transform,
    bone_mesh: &Transform,
    local_offset: Vec3,
) -> Transform {
    let mut result = physics
        .combine_with_parent(&mesh_to_world.invert())
        .combine_with_parent(&bone_mesh.invert());
    subtract_offset(&mut result, local_offset);
    result
}

/// 躯干刚体的物理变换 → 受控模型节点的局部变换
///
/// `mesh_to_model` 是模型根节点在 mesh 坐标中的变换；
/// `parent_world` 为模型父节点的世界变换（没有父节点时传 `None`）。
pub fn spatial_local_from_physics(
    physics: &Transform,
    mesh_to_model: &Transform,
    parent_world: Option<&Transform>,
) -> Transform {
    let model_world = mesh_to_model.combine_with_parent(physics);
    match parent_world {
        Some(parent) => model_world.combine_with_parent(&parent.invert()),
        None => model_world,
    }
}

/// 计算关节两端的局部坐标系
///
/// 枢轴点是几何位置，与缩放无关，所以两端刚体变换的缩放先归一。
pub fn pivot_frames(pivot_world: Vec3, parent_physics: &Transform, child_physics: &Transform) -> JointFrames {
    let parent_to_world = parent_physics.with_uniform_scale(1.0);
    let child_to_world = child_physics.with_uniform_scale(1.0);
    let child_to_parent = child_to_world.combine_with_parent(&parent_to_world.invert());

    JointFrames {
        pivot_parent: parent_to_world.transform_inverse_vector(pivot_world),
        pivot_child: child_to_world.transform_inverse_vector(pivot_world),
        rotation_parent: child_to_parent.rotation,
        rotation_child: Quat::IDENTITY,
    }
}

#[inline]
fn subtract_offset(result: &mut Transform, local_offset: Vec3) {
    let offset = result.rotation * (local_offset * result.scale);
    result.translation -= offset;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_world() -> Transform {
        Transform::new(Vec3::new(5.0, 0.0, -2.0), Quat::from_rotation_y(0.9), Vec3::splat(2.0))
    }

    #[test]
    fn test_bone_local_round_trip() {
        let parent_mesh = Transform::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_z(0.4), Vec3::ONE);
        let local = Transform::new(Vec3::new(0.0, 0.5, 0.0), Quat::from_rotation_x(0.6), Vec3::ONE);
        let offset = Vec3::new(0.0, 0.25, 0.0);

        let bone_mesh = local.combine_with_parent(&parent_mesh);
        let physics = physics_from_bone(offset, &bone_mesh, &mesh_world());
        let recovered = bone_local_from_physics(&physics, &mesh_world(), &parent_mesh, offset);

        assert!(recovered.abs_diff_eq(&local, 1e-4));
    }

    #[test]
    fn test_mesh_round_trip() {
        let root_mesh = Transform::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_y(0.2), Vec3::ONE);
        let offset = Vec3::new(0.0, 0.1, 0.0);
        let physics = physics_from_bone(offset, &root_mesh, &mesh_world());
        let recovered = mesh_from_physics(&physics, &mesh_world(), offset);
        assert!(recovered.abs_diff_eq(&root_mesh, 1e-4));
    }

    #[test]
    fn test_attachment_round_trip() {
        let bone_mesh = Transform::new(Vec3::new(0.3, 1.2, 0.0), Quat::from_rotation_x(-0.3), Vec3::ONE);
        let attached = Transform::new(Vec3::new(0.0, 0.0, 0.2), Quat::from_rotation_z(1.0), Vec3::ONE);
        let offset = Vec3::new(0.05, 0.0, 0.0);
        let physics = attachment_physics(offset, &attached, &bone_mesh, &mesh_world());
        let recovered = model_local_from_physics(&physics, &mesh_world(), &bone_mesh, offset);
        assert!(recovered.abs_diff_eq(&attached, 1e-4));
    }

    #[test]
    fn test_spatial_local_places_mesh_on_body() {
        // 网格节点相对模型根的变换
        let mesh_in_model = Transform::from_translation(Vec3::new(0.0, 0.5, 0.0));
        let mesh_to_model = mesh_in_model.invert();
        let parent = Transform::from_translation(Vec3::new(10.0, 0.0, 0.0));
        let body = Transform::from_rotation_translation(Quat::from_rotation_y(0.5), Vec3::new(11.0, 2.0, 0.0));

        let local = spatial_local_from_physics(&body, &mesh_to_model, Some(&parent));
        let mesh_world = mesh_in_model.combine_with_parent(&local.combine_with_parent(&parent));
        assert!(mesh_world.abs_diff_eq(&body, 1e-4));
    }

    #[test]
    fn test_pivot_frames_ignore_scale() {
        let parent = Transform::new(Vec3::ZERO, Quat::IDENTITY, Vec3::splat(4.0));
        let child = Transform::new(Vec3::new(0.0, -1.0, 0.0), Quat::from_rotation_z(0.5), Vec3::splat(4.0));
        let frames = pivot_frames(Vec3::new(0.0, -0.5, 0.0), &parent, &child);

        assert!(frames.pivot_parent.abs_diff_eq(Vec3::new(0.0, -0.5, 0.0), 1e-5));
        let world_from_child = child.with_uniform_scale(1.0).transform_vector(frames.pivot_child);
        assert!(world_from_child.abs_diff_eq(Vec3::new(0.0, -0.5, 0.0), 1e-5));
        assert!(frames.rotation_parent.abs_diff_eq(Quat::from_rotation_z(0.5), 1e-5));
    }
}
