//! 物理链接
//!
//! 一个链接 = 一根驱动骨骼（或附件）+ 一个独占的刚体 + 到父链接的关节。
//! 链接在运动学（动画驱动刚体）与动力学（刚体驱动骨骼）之间切换；
//! 切回运动学时按 `kinematic_weight` 从起点姿态平滑过渡到目标姿态。
//!
//! 三种变体通过 `LinkKind` 分派，公共的模式状态机在 `PhysicsLink` 中。

use glam::Vec3;

use crate::math::coords::{attachment_physics, physics_from_bone, pivot_frames};
use crate::math::Transform;
use crate::physics::{BodyHandle, BodyId, JointHandle, PhysicsSpace, SixDofJoint};
use crate::savable::{InputCapsule, OutputCapsule, Savable};
use crate::scene::{NodeId, SceneGraph};
use crate::skeleton::Skeleton;
use crate::{RagdollError, Result};

use super::attachment_link::AttachmentLink;
use super::bone_link::BoneLink;
use super::control::RagdollContext;
use super::range_of_motion::{AxisLock, RangeOfMotion};
use super::submode::{KinematicSubmode, ManagedPose};
use super::torso_link::TorsoLink;

/// 链接编号（控制器内 arena 下标，前序排列）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) usize);

impl LinkId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// 链接模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// 骨骼姿态驱动刚体
    #[default]
    Kinematic,
    /// 刚体驱动骨骼姿态
    Dynamic,
}

impl Savable for LinkMode {
    fn write(&self, capsule: &mut OutputCapsule) -> Result<()> {
        capsule.write_bool("dynamic", *self == LinkMode::Dynamic)
    }

    fn read(capsule: &InputCapsule) -> Result<Self> {
        Ok(if capsule.read_bool("dynamic", false)? { LinkMode::Dynamic } else { LinkMode::Kinematic })
    }
}

/// 受控模型在场景中的节点
#[derive(Debug, Clone, Copy)]
pub(crate) struct ModelNodes {
    /// 受控模型根节点
    pub model: NodeId,
    /// 动画几何体节点，其世界变换即 mesh → 世界
    pub transformer: NodeId,
}

impl ModelNodes {
    #[inline]
    pub fn mesh_to_world(&self, scene: &SceneGraph) -> Transform {
        scene.world_transform(self.transformer)
    }
}

/// 链接变体
#[derive(Debug, Clone)]
pub enum LinkKind {
    Torso(TorsoLink),
    Bone(BoneLink),
    Attachment(AttachmentLink),
}

impl LinkKind {
    fn pose(&self) -> Option<&ManagedPose> {
        match self {
            LinkKind::Torso(t) => Some(&t.pose),
            LinkKind::Bone(b) => Some(&b.pose),
            LinkKind::Attachment(_) => None,
        }
    }

    fn pose_mut(&mut self) -> Option<&mut ManagedPose> {
        match self {
            LinkKind::Torso(t) => Some(&mut t.pose),
            LinkKind::Bone(b) => Some(&mut b.pose),
            LinkKind::Attachment(_) => None,
        }
    }
}

/// 物理链接
#[derive(Debug)]
pub struct PhysicsLink {
    name: String,
    /// 驱动骨骼（附件为其挂接的骨骼）
    bone: usize,
    body: BodyHandle,
    parent: Option<LinkId>,
    joint: Option<JointHandle>,
    /// 刚体中心在骨骼局部坐标中的位置
    local_offset: Vec3,
    nodes: ModelNodes,

    mode: LinkMode,
    /// 0 = 过渡刚开始, 1 = 完全运动学
    kinematic_weight: f32,
    /// 当前过渡的总时长
    blend_interval: f32,
    /// 当前过渡剩余时间
    blend_remaining: f32,
    uniform_acceleration: Vec3,

    kind: LinkKind,
}

impl PhysicsLink {
    pub(crate) fn new(
        name: String,
        bone: usize,
        body: BodyHandle,
        local_offset: Vec3,
        nodes: ModelNodes,
        kind: LinkKind,
    ) -> Self {
        Self {
            name,
            bone,
            body,
            parent: None,
            joint: None,
            local_offset,
            nodes,
            mode: LinkMode::Kinematic,
            kinematic_weight: 1.0,
            blend_interval: 0.0,
            blend_remaining: 0.0,
            uniform_acceleration: Vec3::ZERO,
            kind,
        }
    }

    // ========================================
    // 访问器
    // ========================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bone(&self) -> usize {
        self.bone
    }

    pub fn body_id(&self) -> BodyId {
        self.body.id()
    }

    pub fn parent(&self) -> Option<LinkId> {
        self.parent
    }

    pub fn joint(&self) -> Option<&JointHandle> {
        self.joint.as_ref()
    }

    pub fn local_offset(&self) -> Vec3 {
        self.local_offset
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    #[inline]
    pub fn is_kinematic(&self) -> bool {
        self.mode == LinkMode::Kinematic
    }

    pub fn kinematic_weight(&self) -> f32 {
        self.kinematic_weight
    }

    pub fn blend_interval(&self) -> f32 {
        self.blend_interval
    }

    pub fn blend_remaining(&self) -> f32 {
        self.blend_remaining
    }

    pub fn uniform_acceleration(&self) -> Vec3 {
        self.uniform_acceleration
    }

    pub fn kind(&self) -> &LinkKind {
        &self.kind
    }

    pub fn is_bone_link(&self) -> bool {
        matches!(self.kind, LinkKind::Bone(_))
    }

    /// 受管骨骼（附件为空）
    pub fn managed_bones(&self) -> &[usize] {
        self.kind.pose().map(|p| p.bones.as_slice()).unwrap_or(&[])
    }

    pub fn submode(&self) -> Option<KinematicSubmode> {
        self.kind.pose().map(|p| p.submode)
    }

    /// 由当前骨骼姿态推出的刚体变换
    pub fn physics_transform(&self, skeleton: &Skeleton, scene: &SceneGraph) -> Transform {
        let mesh_to_world = self.nodes.mesh_to_world(scene);
        let bone_mesh = skeleton.model_transform(self.bone);
        match &self.kind {
            LinkKind::Torso(_) | LinkKind::Bone(_) => physics_from_bone(self.local_offset, &bone_mesh, &mesh_to_world),
            LinkKind::Attachment(a) => attachment_physics(
                self.local_offset,
                &scene.local_transform(a.attached),
                &bone_mesh,
                &mesh_to_world,
            ),
        }
    }

    // ========================================
    // 构建
    // ========================================

    /// 在本链接与父链接之间创建关节，枢轴为骨骼的 mesh 位置
    pub(crate) fn add_joint(
        &mut self,
        skeleton: &Skeleton,
        scene: &SceneGraph,
        space: &mut PhysicsSpace,
        parent: (LinkId, BodyId, Transform),
        range_of_motion: &RangeOfMotion,
    ) {
        debug_assert!(self.joint.is_none());
        let (parent_id, parent_body, parent_physics) = parent;
        self.parent = Some(parent_id);

        let pivot_mesh = skeleton.bone(self.bone).model_position();
        let pivot_world = self.nodes.mesh_to_world(scene).transform_vector(pivot_mesh);
        let child_physics = self.physics_transform(skeleton, scene);
        let frames = pivot_frames(pivot_world, &parent_physics, &child_physics);

        let mut joint = SixDofJoint::new(frames);
        joint.set_angular_limits(range_of_motion.lower(), range_of_motion.upper());
        joint.collision_between_linked_bodies = false;
        self.joint = Some(space.add_joint(parent_body, self.body.id(), joint));
    }

    /// 从物理空间中释放刚体与关节
    pub(crate) fn release(self, space: &mut PhysicsSpace) {
        if let Some(joint) = self.joint {
            space.remove_joint(joint);
        }
        space.remove_rigid_body(self.body);
    }

    // ========================================
    // 模式切换
    // ========================================

    fn switch_to_dynamic(&mut self, space: &mut PhysicsSpace, acceleration: Vec3) -> Result<()> {
        if !acceleration.is_finite() {
            return Err(RagdollError::InvalidArgument(format!(
                "链接 {} 的均匀加速度无效: {:?}",
                self.name, acceleration
            )));
        }
        if self.mode != LinkMode::Dynamic {
            log::debug!("[布娃娃] 链接 {} -> 动力学", self.name);
        }

        self.mode = LinkMode::Dynamic;
        self.kinematic_weight = 0.0;
        self.blend_interval = 0.0;
        self.blend_remaining = 0.0;
        self.uniform_acceleration = acceleration;

        space.set_kinematic(self.body.id(), false);
        space.set_uniform_acceleration(self.body.id(), acceleration);
        Ok(())
    }

    /// 立即切换为动力学，受管骨骼交由物理控制
    pub fn set_dynamic(&mut self, ctx: &mut RagdollContext, acceleration: Vec3) -> Result<()> {
        self.switch_to_dynamic(ctx.space, acceleration)?;
        if let Some(pose) = self.kind.pose() {
            pose.set_user_control(ctx.skeleton, true);
        }
        Ok(())
    }

    /// 切换为动力学，并把 `locks` 中的旋转轴锁在当前角度（仅骨骼链接）
    pub fn set_dynamic_locked(&mut self, ctx: &mut RagdollContext, acceleration: Vec3, locks: AxisLock) -> Result<()> {
        let LinkKind::Bone(bone_link) = &self.kind else {
            return Err(RagdollError::InvalidArgument(format!("{} 不是骨骼链接", self.name)));
        };
        let range_of_motion = bone_link.range_of_motion;

        self.set_dynamic(ctx, acceleration)?;
        if let Some(joint) = &self.joint {
            range_of_motion.setup_joint(ctx.space, joint, locks);
        }
        Ok(())
    }

    /// 开始向运动学过渡
    ///
    /// `interval` 为 0 时立即完成。`end_model_transform` 只对躯干与附件有意义。
    pub fn blend_to_kinematic_mode(
        &mut self,
        ctx: &mut RagdollContext,
        submode: KinematicSubmode,
        interval: f32,
        end_model_transform: Option<Transform>,
    ) -> Result<()> {
        if !interval.is_finite() || interval < 0.0 {
            return Err(RagdollError::InvalidArgument(format!(
                "链接 {} 的过渡时长无效: {}",
                self.name, interval
            )));
        }

        log::debug!(
            "[布娃娃] 链接 {} -> 运动学 ({}, {:.3}s)",
            self.name,
            submode.name(),
            interval
        );

        self.mode = LinkMode::Kinematic;
        self.blend_interval = interval;
        self.blend_remaining = interval;
        self.kinematic_weight = if interval > 0.0 { 0.0 } else { 1.0 };
        ctx.space.set_kinematic(self.body.id(), true);

        let nodes = self.nodes;
        match &mut self.kind {
            LinkKind::Torso(t) => t.begin_blend(ctx, &nodes, submode, end_model_transform),
            LinkKind::Bone(b) => b.begin_blend(ctx, submode),
            LinkKind::Attachment(a) => a.begin_blend(ctx, end_model_transform),
        }
        Ok(())
    }

    /// 冻结当前姿态
    ///
    /// 运动学链接立即进入 Frozen；动力学骨骼链接去掉加速度并锁死三轴。
    /// 躯干总是转为运动学。
    pub fn freeze(&mut self, ctx: &mut RagdollContext) -> Result<()> {
        let dynamic = self.mode == LinkMode::Dynamic;
        let bone_link = self.is_bone_link();
        let attachment = matches!(self.kind, LinkKind::Attachment(_));

        if dynamic && bone_link {
            self.set_dynamic_locked(ctx, Vec3::ZERO, AxisLock::ALL)
        } else if dynamic && attachment {
            self.set_dynamic(ctx, Vec3::ZERO)
        } else {
            self.blend_to_kinematic_mode(ctx, KinematicSubmode::Frozen, 0.0, None)
        }
    }

    /// 更新旋转范围（仅骨骼链接），立即写入关节
    pub(crate) fn set_range_of_motion(&mut self, space: &mut PhysicsSpace, range_of_motion: RangeOfMotion) -> Result<()> {
        let LinkKind::Bone(bone_link) = &mut self.kind else {
            return Err(RagdollError::InvalidArgument(format!("{} 不是骨骼链接", self.name)));
        };
        bone_link.range_of_motion = range_of_motion;
        if let Some(joint) = &self.joint {
            range_of_motion.setup_joint(space, joint, AxisLock::empty());
        }
        Ok(())
    }

    // ========================================
    // 每帧
    // ========================================

    pub(crate) fn update(&mut self, ctx: &mut RagdollContext, tpf: f32) {
        debug_assert!(tpf >= 0.0);
        let tpf = tpf.max(0.0);

        if let Some(pose) = self.kind.pose_mut() {
            pose.ensure_prev(ctx.skeleton);
        }

        match self.mode {
            LinkMode::Kinematic => {
                self.kinematic_update(ctx);
                self.advance_blend(tpf);
            }
            LinkMode::Dynamic => self.dynamic_update(ctx),
        }

        if let Some(pose) = self.kind.pose_mut() {
            pose.save_prev(ctx.skeleton);
        }
    }

    /// 先用当前权重混合，再推进权重
    fn advance_blend(&mut self, tpf: f32) {
        if self.kinematic_weight >= 1.0 {
            return;
        }
        self.blend_remaining = (self.blend_remaining - tpf).max(0.0);
        self.kinematic_weight = if self.blend_interval > 0.0 {
            (1.0 - self.blend_remaining / self.blend_interval).clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    fn kinematic_update(&mut self, ctx: &mut RagdollContext) {
        let weight = self.kinematic_weight;
        let nodes = self.nodes;
        match &mut self.kind {
            LinkKind::Torso(t) => t.kinematic_update(ctx, &nodes, weight),
            LinkKind::Bone(b) => b.kinematic_update(ctx, weight),
            LinkKind::Attachment(a) => a.kinematic_update(ctx, weight),
        }
        // 刚体变换由 pre_physics_tick 同步
    }

    fn dynamic_update(&mut self, ctx: &mut RagdollContext) {
        let physics = ctx.space.physics_transform(self.body.id());
        let nodes = self.nodes;
        let (bone, offset) = (self.bone, self.local_offset);
        match &mut self.kind {
            LinkKind::Torso(t) => t.dynamic_update(ctx, &nodes, &physics, offset),
            LinkKind::Bone(b) => b.dynamic_update(ctx, &nodes, bone, &physics, offset),
            LinkKind::Attachment(a) => a.dynamic_update(ctx, &nodes, bone, &physics, offset),
        }
    }

    /// 物理步进前：运动学刚体跟随骨骼
    pub(crate) fn pre_physics_tick(&self, skeleton: &Skeleton, scene: &SceneGraph, space: &mut PhysicsSpace) {
        if self.is_kinematic() {
            space.set_kinematic_target(self.body.id(), &self.physics_transform(skeleton, scene));
        }
    }

    // ========================================
    // 状态快照
    // ========================================

    /// 导出可持久化的状态（不含句柄）
    pub fn state(&self, space: &PhysicsSpace) -> LinkState {
        let mut state = LinkState {
            name: self.name.clone(),
            mode: self.mode,
            kinematic_weight: self.kinematic_weight,
            blend_interval: self.blend_interval,
            blend_remaining: self.blend_remaining,
            uniform_acceleration: self.uniform_acceleration,
            local_offset: self.local_offset,
            body_transform: space.physics_transform(self.body.id()),
            submode: KinematicSubmode::Animated,
            prev_bone_transforms: None,
            start_bone_transforms: Vec::new(),
            start_model_transform: Transform::IDENTITY,
            end_model_transform: None,
        };

        if let Some(pose) = self.kind.pose() {
            state.submode = pose.submode;
            state.prev_bone_transforms = pose.prev.clone();
            state.start_bone_transforms = pose.start.clone();
        }
        match &self.kind {
            LinkKind::Torso(t) => {
                state.start_model_transform = t.start_model_transform;
                state.end_model_transform = t.end_model_transform;
            }
            LinkKind::Attachment(a) => {
                state.start_model_transform = a.start_model_transform;
                state.end_model_transform = a.end_model_transform;
            }
            LinkKind::Bone(_) => {}
        }
        state
    }

    /// 恢复状态：模式、过渡进度、受管骨骼的起点/上一帧姿态以及刚体变换
    pub fn apply_state(&mut self, ctx: &mut RagdollContext, state: &LinkState) -> Result<()> {
        let managed = self.managed_bones().len();
        if state.start_bone_transforms.len() != managed
            || state.prev_bone_transforms.as_ref().is_some_and(|p| p.len() != managed)
        {
            return Err(RagdollError::InvalidArgument(format!(
                "链接 {} 的受管骨骼数量不符: {} != {}",
                self.name,
                state.start_bone_transforms.len(),
                managed
            )));
        }

        match state.mode {
            LinkMode::Dynamic => self.set_dynamic(ctx, state.uniform_acceleration)?,
            LinkMode::Kinematic => {
                self.mode = LinkMode::Kinematic;
                ctx.space.set_kinematic(self.body.id(), true);
                if let Some(pose) = self.kind.pose() {
                    pose.set_user_control(ctx.skeleton, state.submode != KinematicSubmode::Animated);
                }
            }
        }
        self.kinematic_weight = state.kinematic_weight;
        self.blend_interval = state.blend_interval;
        self.blend_remaining = state.blend_remaining;
        self.uniform_acceleration = state.uniform_acceleration;

        if let Some(pose) = self.kind.pose_mut() {
            pose.submode = state.submode;
            pose.prev = state.prev_bone_transforms.clone();
            pose.start = state.start_bone_transforms.clone();
        }
        match &mut self.kind {
            LinkKind::Torso(t) => {
                t.start_model_transform = state.start_model_transform;
                t.end_model_transform = state.end_model_transform;
            }
            LinkKind::Attachment(a) => {
                a.start_model_transform = state.start_model_transform;
                a.end_model_transform = state.end_model_transform;
            }
            LinkKind::Bone(_) => {}
        }

        ctx.space.set_physics_transform(self.body.id(), &state.body_transform);
        Ok(())
    }
}

/// 链接的可持久化状态
#[derive(Debug, Clone, PartialEq)]
pub struct LinkState {
    pub name: String,
    pub mode: LinkMode,
    pub kinematic_weight: f32,
    pub blend_interval: f32,
    pub blend_remaining: f32,
    pub uniform_acceleration: Vec3,
    pub local_offset: Vec3,
    pub body_transform: Transform,
    pub submode: KinematicSubmode,
    /// 尚未 update 过时为 `None`
    pub prev_bone_transforms: Option<Vec<Transform>>,
    pub start_bone_transforms: Vec<Transform>,
    pub start_model_transform: Transform,
    pub end_model_transform: Option<Transform>,
}

impl Savable for LinkState {
    fn write(&self, capsule: &mut OutputCapsule) -> Result<()> {
        capsule.write_string("name", &self.name)?;
        capsule.write_savable("mode", &self.mode)?;
        capsule.write_f32("kinematicWeight", self.kinematic_weight)?;
        capsule.write_f32("blendInterval", self.blend_interval)?;
        capsule.write_f32("blendRemaining", self.blend_remaining)?;
        capsule.write_vec3("uniformAcceleration", self.uniform_acceleration)?;
        capsule.write_vec3("localOffset", self.local_offset)?;
        capsule.write_savable("bodyTransform", &self.body_transform)?;
        capsule.write_savable("submode", &self.submode)?;
        if let Some(prev) = &self.prev_bone_transforms {
            capsule.write_savable_array("prevBoneTransforms", prev)?;
        }
        capsule.write_savable_array("startBoneTransforms", &self.start_bone_transforms)?;
        capsule.write_savable("startModelTransform", &self.start_model_transform)?;
        capsule.write_optional("endModelTransform", self.end_model_transform.as_ref())
    }

    fn read(capsule: &InputCapsule) -> Result<Self> {
        let name = capsule
            .read_string("name")?
            .ok_or_else(|| RagdollError::MissingField("name".to_string()))?;
        let prev_bone_transforms = if capsule.contains("prevBoneTransforms") {
            Some(capsule.read_savable_array("prevBoneTransforms")?)
        } else {
            None
        };

        Ok(Self {
            name,
            mode: capsule.read_savable("mode")?.unwrap_or_default(),
            kinematic_weight: capsule.read_f32("kinematicWeight", 1.0)?,
            blend_interval: capsule.read_f32("blendInterval", 0.0)?,
            blend_remaining: capsule.read_f32("blendRemaining", 0.0)?,
            uniform_acceleration: capsule.read_vec3("uniformAcceleration", Vec3::ZERO)?,
            local_offset: capsule.read_vec3("localOffset", Vec3::ZERO)?,
            body_transform: capsule.require_savable("bodyTransform")?,
            submode: capsule.read_savable("submode")?.unwrap_or_default(),
            prev_bone_transforms,
            start_bone_transforms: capsule.read_savable_array("startBoneTransforms")?,
            start_model_transform: capsule.read_savable("startModelTransform")?.unwrap_or_default(),
            end_model_transform: capsule.read_savable("endModelTransform")?,
        })
    }
}
