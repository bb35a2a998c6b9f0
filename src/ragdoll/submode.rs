//! 运动学子模式与受管骨骼姿态

use glam::Vec3;

use crate::math::Transform;
use crate::savable::{InputCapsule, OutputCapsule, Savable};
use crate::skeleton::Skeleton;
use crate::{RagdollError, Result};

/// 截肢时使用的缩放
const AMPUTATED_SCALE: f32 = 0.001;

/// 运动学模式下骨骼的目标姿态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KinematicSubmode {
    /// 跟随动画
    #[default]
    Animated,
    /// 绑定姿态
    Bound,
    /// 绑定姿态，缩放接近 0
    Amputated,
    /// 保持进入过渡前最后一帧的姿态
    Frozen,
}

impl KinematicSubmode {
    pub fn name(self) -> &'static str {
        match self {
            KinematicSubmode::Animated => "Animated",
            KinematicSubmode::Bound => "Bound",
            KinematicSubmode::Amputated => "Amputated",
            KinematicSubmode::Frozen => "Frozen",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Animated" => Some(KinematicSubmode::Animated),
            "Bound" => Some(KinematicSubmode::Bound),
            "Amputated" => Some(KinematicSubmode::Amputated),
            "Frozen" => Some(KinematicSubmode::Frozen),
            _ => None,
        }
    }
}

impl Savable for KinematicSubmode {
    fn write(&self, capsule: &mut OutputCapsule) -> Result<()> {
        capsule.write_string("submode", self.name())
    }

    fn read(capsule: &InputCapsule) -> Result<Self> {
        match capsule.read_string("submode")? {
            Some(name) => Self::from_name(&name)
                .ok_or_else(|| RagdollError::Capsule(format!("未知子模式: {}", name))),
            None => Ok(KinematicSubmode::default()),
        }
    }
}

/// 一个链接直接驱动的骨骼（躯干链接与骨骼链接共用）
///
/// 每根受管骨骼各有一个“上一帧”与“过渡起点”局部变换。
#[derive(Debug, Clone)]
pub(crate) struct ManagedPose {
    /// 受管骨骼，前序（父骨骼在前）
    pub bones: Vec<usize>,
    pub submode: KinematicSubmode,
    /// 上一次 update 结束时的局部变换，尚未 update 过时为 `None`
    pub prev: Option<Vec<Transform>>,
    pub start: Vec<Transform>,
}

impl ManagedPose {
    pub fn new(bones: Vec<usize>) -> Self {
        let start = vec![Transform::IDENTITY; bones.len()];
        Self { bones, submode: KinematicSubmode::Animated, prev: None, start }
    }

    fn local_transforms(&self, skeleton: &Skeleton) -> Vec<Transform> {
        self.bones.iter().map(|&b| skeleton.local_transform(b)).collect()
    }

    /// 第一次 update 前记录当前姿态
    pub fn ensure_prev(&mut self, skeleton: &Skeleton) {
        if self.prev.is_none() {
            self.prev = Some(self.local_transforms(skeleton));
        }
    }

    /// update 结束时保存姿态
    pub fn save_prev(&mut self, skeleton: &Skeleton) {
        self.prev = Some(self.local_transforms(skeleton));
    }

    /// 过渡开始：记录起点并设置用户控制
    pub fn begin_blend(&mut self, skeleton: &mut Skeleton, submode: KinematicSubmode) {
        self.submode = submode;
        self.start = match &self.prev {
            Some(prev) => prev.clone(),
            None => self.local_transforms(skeleton),
        };

        let user_control = submode != KinematicSubmode::Animated;
        self.set_user_control(skeleton, user_control);
    }

    pub fn set_user_control(&self, skeleton: &mut Skeleton, enabled: bool) {
        for &bone in &self.bones {
            skeleton.set_user_control(bone, enabled);
        }
    }

    /// 按子模式求目标姿态，权重小于 1 时与起点混合，写入骨骼
    pub fn kinematic_update(&self, skeleton: &mut Skeleton, weight: f32) {
        for (i, &bone) in self.bones.iter().enumerate() {
            let candidate = match self.submode {
                KinematicSubmode::Animated => skeleton.local_transform(bone),
                KinematicSubmode::Bound => skeleton.bone(bone).bind,
                KinematicSubmode::Amputated => {
                    let mut t = skeleton.bone(bone).bind;
                    t.scale = Vec3::splat(AMPUTATED_SCALE);
                    t
                }
                KinematicSubmode::Frozen => self
                    .prev
                    .as_ref()
                    .and_then(|p| p.get(i).copied())
                    .unwrap_or_else(|| skeleton.local_transform(bone)),
            };

            let transform = if weight < 1.0 {
                Transform::blend(weight, &self.start[i], &candidate)
            } else {
                candidate
            };
            skeleton.set_local_transform(bone, transform);
            skeleton.update_model_transform(bone);
        }
    }

    /// 刷新受管骨骼的 mesh 变换（前序保证父骨骼先更新）
    pub fn refresh_model_transforms(&self, skeleton: &mut Skeleton) {
        for &bone in &self.bones {
            skeleton.update_model_transform(bone);
        }
    }
}
