//! 骨骼链接
//!
//! 绑定一根非根骨骼。受管骨骼为该骨骼本身（排第一）及其未链接的后代。

use glam::Vec3;

use crate::math::coords::bone_local_from_physics;
use crate::math::Transform;

use super::control::RagdollContext;
use super::link::ModelNodes;
use super::range_of_motion::RangeOfMotion;
use super::submode::{KinematicSubmode, ManagedPose};

/// 骨骼链接的专有状态
#[derive(Debug, Clone)]
pub struct BoneLink {
    pub(crate) pose: ManagedPose,
    pub(crate) range_of_motion: RangeOfMotion,
}

impl BoneLink {
    pub(crate) fn new(managed_bones: Vec<usize>, range_of_motion: RangeOfMotion) -> Self {
        debug_assert!(!managed_bones.is_empty());
        Self { pose: ManagedPose::new(managed_bones), range_of_motion }
    }

    pub fn managed_bones(&self) -> &[usize] {
        &self.pose.bones
    }

    pub fn submode(&self) -> KinematicSubmode {
        self.pose.submode
    }

    pub fn range_of_motion(&self) -> &RangeOfMotion {
        &self.range_of_motion
    }

    pub(crate) fn begin_blend(&mut self, ctx: &mut RagdollContext, submode: KinematicSubmode) {
        self.pose.begin_blend(ctx.skeleton, submode);
    }

    pub(crate) fn kinematic_update(&mut self, ctx: &mut RagdollContext, weight: f32) {
        self.pose.kinematic_update(ctx.skeleton, weight);
    }

    /// 刚体 → 骨骼局部变换（相对骨架中的父骨骼）
    pub(crate) fn dynamic_update(
        &mut self,
        ctx: &mut RagdollContext,
        nodes: &ModelNodes,
        bone: usize,
        physics: &Transform,
        local_offset: Vec3,
    ) {
        let mesh_to_world = nodes.mesh_to_world(ctx.scene);
        let parent_mesh = match ctx.skeleton.bone(bone).parent {
            Some(parent) => ctx.skeleton.model_transform(parent),
            None => Transform::IDENTITY,
        };

        let local = bone_local_from_physics(physics, &mesh_to_world, &parent_mesh, local_offset);
        ctx.skeleton.set_local_transform(bone, local);
        self.pose.refresh_model_transforms(ctx.skeleton);
    }
}
