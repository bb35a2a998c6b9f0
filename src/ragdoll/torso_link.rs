//! 躯干链接
//!
//! 层级的根。驱动骨骼为主根骨骼，受管骨骼为全部根骨骼及其未链接的后代。
//! 动力学模式下除了骨骼，还要改写受控模型节点自身的局部变换。

use crate::math::coords::{mesh_from_physics, spatial_local_from_physics};
use crate::math::Transform;

use super::control::RagdollContext;
use super::link::ModelNodes;
use super::submode::{KinematicSubmode, ManagedPose};

/// 躯干链接的专有状态
#[derive(Debug, Clone)]
pub struct TorsoLink {
    pub(crate) pose: ManagedPose,
    /// 模型根节点在 mesh 坐标中的变换
    pub(crate) mesh_to_model: Transform,
    pub(crate) start_model_transform: Transform,
    pub(crate) end_model_transform: Option<Transform>,
}

impl TorsoLink {
    pub(crate) fn new(managed_bones: Vec<usize>, mesh_to_model: Transform) -> Self {
        Self {
            pose: ManagedPose::new(managed_bones),
            mesh_to_model,
            start_model_transform: Transform::IDENTITY,
            end_model_transform: None,
        }
    }

    pub fn managed_bones(&self) -> &[usize] {
        &self.pose.bones
    }

    pub fn submode(&self) -> KinematicSubmode {
        self.pose.submode
    }

    pub fn end_model_transform(&self) -> Option<&Transform> {
        self.end_model_transform.as_ref()
    }

    pub(crate) fn begin_blend(
        &mut self,
        ctx: &mut RagdollContext,
        nodes: &ModelNodes,
        submode: KinematicSubmode,
        end_model_transform: Option<Transform>,
    ) {
        self.end_model_transform = end_model_transform;
        if self.end_model_transform.is_some() {
            self.start_model_transform = ctx.scene.local_transform(nodes.model);
        }
        self.pose.begin_blend(ctx.skeleton, submode);
    }

    pub(crate) fn kinematic_update(&mut self, ctx: &mut RagdollContext, nodes: &ModelNodes, weight: f32) {
        if let Some(end) = &self.end_model_transform {
            let transform = Transform::blend(weight, &self.start_model_transform, end);
            ctx.scene.set_local_transform(nodes.model, transform);
        }
        self.pose.kinematic_update(ctx.skeleton, weight);
    }

    /// 刚体 → 模型节点 → 全部根骨骼
    pub(crate) fn dynamic_update(
        &mut self,
        ctx: &mut RagdollContext,
        nodes: &ModelNodes,
        physics: &Transform,
        local_offset: glam::Vec3,
    ) {
        let parent_world = ctx.scene.parent(nodes.model).map(|p| ctx.scene.world_transform(p));
        let spatial = spatial_local_from_physics(physics, &self.mesh_to_model, parent_world.as_ref());
        ctx.scene.set_local_transform(nodes.model, spatial);

        // 模型节点已移动，mesh 变换需要重新取
        let mesh_to_world = nodes.mesh_to_world(ctx.scene);
        let root_local = mesh_from_physics(physics, &mesh_to_world, local_offset);
        let roots = ctx.skeleton.roots().to_vec();
        for root in roots {
            ctx.skeleton.set_local_transform(root, root_local);
        }
        self.pose.refresh_model_transforms(ctx.skeleton);
    }
}
