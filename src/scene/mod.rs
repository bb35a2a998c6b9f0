//! 极简场景图
//!
//! 只保留布娃娃需要的部分：节点层级和局部变换。
//! 受控模型根节点、动画几何体（mesh）节点、附件模型都是这里的节点。

use crate::error::{RagdollError, Result};
use crate::math::Transform;

/// 场景节点句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// 场景节点
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: String,
    pub parent: Option<NodeId>,
    pub local: Transform,
}

/// 场景图
#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str, parent: Option<NodeId>, local: Transform) -> Result<NodeId> {
        if let Some(p) = parent {
            if p.0 >= self.nodes.len() {
                return Err(RagdollError::InvalidArgument(format!("父节点不存在: {:?}", p)));
            }
        }
        self.nodes.push(SceneNode { name: name.to_string(), parent, local });
        Ok(NodeId(self.nodes.len() - 1))
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id.0]
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    #[inline]
    pub fn local_transform(&self, id: NodeId) -> Transform {
        self.nodes[id.0].local
    }

    #[inline]
    pub fn set_local_transform(&mut self, id: NodeId, transform: Transform) {
        self.nodes[id.0].local = transform;
    }

    /// 世界变换（逐级合并父节点）
    pub fn world_transform(&self, id: NodeId) -> Transform {
        let mut result = self.nodes[id.0].local;
        let mut current = self.nodes[id.0].parent;
        while let Some(p) = current {
            result = result.combine_with_parent(&self.nodes[p.0].local);
            current = self.nodes[p.0].parent;
        }
        result
    }

    /// `id` 相对祖先 `ancestor` 的变换（`id == ancestor` 时为单位变换）
    pub fn transform_relative_to(&self, id: NodeId, ancestor: NodeId) -> Result<Transform> {
        let mut result = Transform::IDENTITY;
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return Ok(result);
            }
            result = result.combine_with_parent(&self.nodes[node.0].local);
            current = self.nodes[node.0].parent;
        }
        Err(RagdollError::InvalidArgument(format!(
            "节点 {} 不在 {} 之下",
            self.nodes[id.0].name, self.nodes[ancestor.0].name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_world_and_relative_transforms() {
        let mut scene = SceneGraph::new();
        let world = scene.add_node("world", None, Transform::from_translation(Vec3::X)).unwrap();
        let model = scene.add_node("model", Some(world), Transform::from_translation(Vec3::Y)).unwrap();
        let mesh = scene.add_node("mesh", Some(model), Transform::from_translation(Vec3::Z)).unwrap();

        assert!(scene.world_transform(mesh).translation.abs_diff_eq(Vec3::ONE, 1e-6));
        let rel = scene.transform_relative_to(mesh, model).unwrap();
        assert!(rel.translation.abs_diff_eq(Vec3::Z, 1e-6));
        assert!(scene.transform_relative_to(world, mesh).is_err());
        assert_eq!(scene.find("model"), Some(model));
    }
}
