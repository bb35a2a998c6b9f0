//! 附件链接
//!
//! 附件（如手持武器）挂在某根骨骼上，由管理该骨骼的链接作为父链接。
//! 没有受管骨骼，直接改写附件节点相对骨骼的局部变换。

use glam::Vec3;

use crate::math::coords::model_local_from_physics;
use crate::math::Transform;
use crate::scene::NodeId;

use super::control::RagdollContext;
use super::link::ModelNodes;

/// 附件链接的专有状态
#[derive(Debug, Clone)]
pub struct AttachmentLink {
    pub(crate) attached: NodeId,
    pub(crate) start_model_transform: Transform,
    pub(crate) end_model_transform: Option<Transform>,
}

impl AttachmentLink {
    pub(crate) fn new(attached: NodeId) -> Self {
        Self {
            attached,
            start_model_transform: Transform::IDENTITY,
            end_model_transform: None,
        }
    }

    /// 附件节点
    pub fn attached_model(&self) -> NodeId {
        self.attached
    }

    pub(crate) fn begin_blend(&mut self, ctx: &mut RagdollContext, end_model_transform: Option<Transform>) {
        self.end_model_transform = end_model_transform;
        if self.end_model_transform.is_some() {
            self.start_model_transform = ctx.scene.local_transform(self.attached);
        }
    }

    pub(crate) fn kinematic_update(&mut self, ctx: &mut RagdollContext, weight: f32) {
        if let Some(end) = &self.end_model_transform {
            let transform = Transform::blend(weight, &self.start_model_transform, end);
            ctx.scene.set_local_transform(self.attached, transform);
        }
    }

    pub(crate) fn dynamic_update(
        &mut self,
        ctx: &mut RagdollContext,
        nodes: &ModelNodes,
        bone: usize,
        physics: &Transform,
        local_offset: Vec3,
    ) {
        let mesh_to_world = nodes.mesh_to_world(ctx.scene);
        let bone_mesh = ctx.skeleton.model_transform(bone);
        let local = model_local_from_physics(physics, &mesh_to_world, &bone_mesh, local_offset);
        ctx.scene.set_local_transform(self.attached, local);
    }
}
