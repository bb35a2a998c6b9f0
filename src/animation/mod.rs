//! 动画系统
//!
//! 布娃娃把动画当作外部姿态来源：`AnimationClip::apply` 把采样结果写入
//! 未被用户控制的骨骼，随后刷新 mesh 空间变换。

mod pose_track;

pub use pose_track::{BonePoseTrack, PoseFrame, PoseKeyframe};

use std::collections::HashMap;

use crate::math::Transform;
use crate::skeleton::Skeleton;

/// 动画片段（骨骼名 -> 姿态轨道）
#[derive(Debug, Clone)]
pub struct AnimationClip {
    /// 帧率
    pub fps: f32,
    tracks: HashMap<String, BonePoseTrack>,
}

impl AnimationClip {
    pub fn new(fps: f32) -> Self {
        Self { fps, tracks: HashMap::new() }
    }

    /// 获取或创建某骨骼的轨道
    pub fn track_mut(&mut self, bone_name: &str) -> &mut BonePoseTrack {
        self.tracks.entry(bone_name.to_string()).or_default()
    }

    pub fn track(&self, bone_name: &str) -> Option<&BonePoseTrack> {
        self.tracks.get(bone_name)
    }

    /// 片段时长（秒）
    pub fn duration(&self) -> f32 {
        let max_frame = self.tracks.values().map(|t| t.max_frame_index()).max().unwrap_or(0);
        max_frame as f32 / self.fps
    }

    /// 在 `time` 秒处采样并写入骨骼
    ///
    /// 跳过 `user_control` 为 true 的骨骼，它们由布娃娃链接驱动。
    pub fn apply(&self, skeleton: &mut Skeleton, time: f32) {
        let frame = (time.max(0.0) * self.fps).max(0.0);
        let frame_index = frame.floor() as u32;
        let amount = frame - frame.floor();

        for (name, track) in &self.tracks {
            let Some(index) = skeleton.find_bone(name) else {
                continue;
            };
            if skeleton.bone(index).user_control {
                continue;
            }
            if let Some(pose) = track.seek_precisely(frame_index, amount) {
                let scale = skeleton.bone(index).bind.scale;
                skeleton.set_local_transform(index, Transform::new(pose.translation, pose.orientation, scale));
            }
        }

        skeleton.update_model_transforms();
    }
}
