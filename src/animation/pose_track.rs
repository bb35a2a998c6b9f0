//! 姿态轨道
//!
//! 存储单个骨骼的所有关键帧，并提供查找和插值功能。
//! 帧间使用线性插值（旋转走球面插值）。

use std::collections::BTreeMap;

use glam::{Quat, Vec3};

/// 骨骼关键帧
#[derive(Debug, Clone, Copy)]
pub struct PoseKeyframe {
    /// 帧索引
    pub frame_index: u32,
    /// 平移（相对父骨骼）
    pub translation: Vec3,
    /// 旋转（相对父骨骼）
    pub orientation: Quat,
}

impl PoseKeyframe {
    pub fn new(frame_index: u32, translation: Vec3, orientation: Quat) -> Self {
        Self { frame_index, translation, orientation }
    }
}

/// 骨骼帧变换结果
#[derive(Debug, Clone, Copy)]
pub struct PoseFrame {
    pub translation: Vec3,
    pub orientation: Quat,
}

/// 骨骼姿态轨道
#[derive(Debug, Clone, Default)]
pub struct BonePoseTrack {
    /// 关键帧映射（帧索引 -> 关键帧）
    pub keyframes: BTreeMap<u32, PoseKeyframe>,
}

impl BonePoseTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入关键帧
    pub fn insert_keyframe(&mut self, keyframe: PoseKeyframe) -> Option<PoseKeyframe> {
        self.keyframes.insert(keyframe.frame_index, keyframe)
    }

    /// 移除关键帧
    pub fn remove_keyframe(&mut self, frame_index: u32) -> Option<PoseKeyframe> {
        self.keyframes.remove(&frame_index)
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// 最大帧索引
    pub fn max_frame_index(&self) -> u32 {
        self.keyframes.keys().next_back().copied().unwrap_or(0)
    }

    /// 查找最近的前后关键帧
    fn search_closest_keyframes(&self, frame_index: u32) -> (Option<&PoseKeyframe>, Option<&PoseKeyframe>) {
        let prev = self.keyframes.range(..=frame_index).next_back().map(|(_, kf)| kf);
        let next = self.keyframes.range(frame_index + 1..).next().map(|(_, kf)| kf);
        (prev, next)
    }

    /// 求值（`amount` 为帧内小数部分）
    pub fn seek_precisely(&self, frame_index: u32, amount: f32) -> Option<PoseFrame> {
        let (prev_kf, next_kf) = self.search_closest_keyframes(frame_index);

        let frame = match (prev_kf, next_kf) {
            (Some(prev), Some(next)) => {
                let interval = (next.frame_index - prev.frame_index) as f32;
                let coef = ((frame_index - prev.frame_index) as f32 + amount) / interval;
                let coef = coef.clamp(0.0, 1.0);
                PoseFrame {
                    translation: prev.translation.lerp(next.translation, coef),
                    orientation: prev.orientation.slerp(next.orientation, coef),
                }
            }
            // 只有前帧，使用前帧数据
            (Some(prev), None) => PoseFrame {
                translation: prev.translation,
                orientation: prev.orientation,
            },
            // 只有后帧，使用后帧数据
            (None, Some(next)) => PoseFrame {
                translation: next.translation,
                orientation: next.orientation,
            },
            (None, None) => return None,
        };
        Some(frame)
    }
}
