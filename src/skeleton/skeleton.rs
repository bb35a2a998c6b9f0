//! 骨骼集合
//!
//! 骨骼按前序（父在子前）存放在一个 Vec 中，父索引总是小于子索引，
//! 因此按索引顺序遍历一次即可完成 mesh 空间变换的更新。

use std::collections::HashMap;

use crate::error::{RagdollError, Result};
use crate::math::Transform;

use super::Bone;

/// 骨骼集合
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    name_to_index: HashMap<String, usize>,
    roots: Vec<usize>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加骨骼
    ///
    /// 父骨骼必须已经存在，保证父索引小于子索引。
    pub fn add_bone(&mut self, name: &str, parent: Option<&str>, bind: Transform) -> Result<usize> {
        if self.name_to_index.contains_key(name) {
            return Err(RagdollError::InvalidArgument(format!("骨骼重名: {}", name)));
        }
        let parent_index = match parent {
            Some(parent_name) => Some(
                self.find_bone(parent_name)
                    .ok_or_else(|| RagdollError::BoneNotFound(parent_name.to_string()))?,
            ),
            None => None,
        };

        let index = self.bones.len();
        let mut bone = Bone::new(name, bind);
        bone.index = index;
        bone.parent = parent_index;
        if let Some(p) = parent_index {
            bone.model = bind.combine_with_parent(&self.bones[p].model);
            self.bones[p].children.push(index);
        } else {
            self.roots.push(index);
        }

        self.bones.push(bone);
        self.name_to_index.insert(name.to_string(), index);
        Ok(index)
    }

    #[inline]
    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    #[inline]
    pub fn bone(&self, index: usize) -> &Bone {
        &self.bones[index]
    }

    #[inline]
    pub fn bone_mut(&mut self, index: usize) -> &mut Bone {
        &mut self.bones[index]
    }

    #[inline]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[inline]
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    pub fn local_transform(&self, index: usize) -> Transform {
        self.bones[index].local
    }

    #[inline]
    pub fn set_local_transform(&mut self, index: usize, transform: Transform) {
        self.bones[index].local = transform;
    }

    /// mesh 空间变换
    #[inline]
    pub fn model_transform(&self, index: usize) -> Transform {
        self.bones[index].model
    }

    /// 用父骨骼当前的 mesh 变换刷新单根骨骼
    pub fn update_model_transform(&mut self, index: usize) {
        let model = match self.bones[index].parent {
            Some(p) => self.bones[index].local.combine_with_parent(&self.bones[p].model),
            None => self.bones[index].local,
        };
        self.bones[index].model = model;
    }

    /// 刷新全部骨骼的 mesh 变换
    pub fn update_model_transforms(&mut self) {
        for index in 0..self.bones.len() {
            self.update_model_transform(index);
        }
    }

    /// 恢复绑定姿态并刷新
    pub fn reset_and_update(&mut self) {
        for bone in &mut self.bones {
            bone.reset_to_bind();
        }
        self.update_model_transforms();
    }

    pub fn set_user_control(&mut self, index: usize, enabled: bool) {
        self.bones[index].user_control = enabled;
    }

    pub fn set_user_control_all(&mut self, enabled: bool) {
        for bone in &mut self.bones {
            bone.user_control = enabled;
        }
    }

    /// 以 `index` 为根的子树，前序
    pub fn subtree(&self, index: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            result.push(i);
            // 逆序压栈，保证子骨骼按添加顺序出栈
            for &child in self.bones[i].children.iter().rev() {
                stack.push(child);
            }
        }
        result
    }

    /// `ancestor` 是否为 `index` 的祖先（不含自身）
    pub fn is_ancestor(&self, ancestor: usize, index: usize) -> bool {
        let mut current = self.bones[index].parent;
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.bones[p].parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn chain() -> Skeleton {
        let mut skeleton = Skeleton::new();
        skeleton.add_bone("root", None, Transform::from_translation(Vec3::new(0.0, 1.0, 0.0))).unwrap();
        skeleton
            .add_bone("a", Some("root"), Transform::from_rotation_translation(Quat::from_rotation_z(0.5), Vec3::Y))
            .unwrap();
        skeleton.add_bone("b", Some("a"), Transform::from_translation(Vec3::Y)).unwrap();
        skeleton.add_bone("c", Some("root"), Transform::from_translation(Vec3::X)).unwrap();
        skeleton
    }

    #[test]
    fn test_model_transform_accumulates() {
        let skeleton = chain();
        let b = skeleton.find_bone("b").unwrap();
        let expected = Vec3::new(0.0, 2.0, 0.0) + Quat::from_rotation_z(0.5) * Vec3::Y;
        assert!(skeleton.model_transform(b).translation.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_subtree_is_preorder() {
        let skeleton = chain();
        let names: Vec<&str> = skeleton.subtree(0).iter().map(|&i| skeleton.bone(i).name.as_str()).collect();
        assert_eq!(names, vec!["root", "a", "b", "c"]);
    }

    #[test]
    fn test_unknown_parent_is_error() {
        let mut skeleton = chain();
        let err = skeleton.add_bone("x", Some("missing"), Transform::IDENTITY);
        assert!(matches!(err, Err(RagdollError::BoneNotFound(_))));
    }

    #[test]
    fn test_reset_and_update_restores_bind() {
        let mut skeleton = chain();
        let a = skeleton.find_bone("a").unwrap();
        skeleton.set_local_transform(a, Transform::from_translation(Vec3::new(9.0, 9.0, 9.0)));
        skeleton.update_model_transforms();
        skeleton.reset_and_update();
        assert_eq!(skeleton.local_transform(a), skeleton.bone(a).bind);
        assert!(skeleton.is_ancestor(0, skeleton.find_bone("b").unwrap()));
    }
}
