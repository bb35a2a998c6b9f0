//! DynamicAnimControl - 布娃娃控制器
//!
//! 流程：配置（link/attach）→ build → 每帧 update → PhysicsSpace::step（tick 回调）→ ... → detach
//!
//! 链接按前序存放在 arena 中：躯干固定为 0 号，骨骼链接按骨架前序（父在子前），
//! 附件排在最后。刚体到链接的反查通过显式的 `BodyId -> LinkId` 表完成。

use std::collections::HashMap;

use glam::Vec3;

use crate::math::coords::{attachment_physics, physics_from_bone};
use crate::math::Transform;
use crate::physics::{
    get_config, BodyHandle, BodyId, BodyShape, ContactEvent, PhysicsSpace, PhysicsTickListener,
    RigidBodyDesc,
};
use crate::savable::{InputCapsule, OutputCapsule};
use crate::scene::{NodeId, SceneGraph};
use crate::skeleton::Skeleton;
use crate::{RagdollError, Result};

use super::attachment_link::AttachmentLink;
use super::bone_link::BoneLink;
use super::link::{LinkId, LinkKind, LinkState, ModelNodes, PhysicsLink};
use super::range_of_motion::{AxisLock, RangeOfMotion};
use super::submode::KinematicSubmode;
use super::torso_link::TorsoLink;
use super::{AttachmentConfig, LinkConfig};

/// 躯干链接的名称
pub const TORSO_NAME: &str = "~torso";

/// 布娃娃每次调用需要的外部协作者
pub struct RagdollContext<'a> {
    pub skeleton: &'a mut Skeleton,
    pub scene: &'a mut SceneGraph,
    pub space: &'a mut PhysicsSpace,
}

impl<'a> RagdollContext<'a> {
    pub fn new(skeleton: &'a mut Skeleton, scene: &'a mut SceneGraph, space: &'a mut PhysicsSpace) -> Self {
        Self { skeleton, scene, space }
    }
}

/// 布娃娃碰撞监听者
pub trait RagdollCollisionListener {
    /// `link` 的刚体受到冲量为 `impulse` 的接触；`other` 为对方链接（若对方也属于布娃娃）
    fn collide(&mut self, link: &PhysicsLink, other: Option<&PhysicsLink>, impulse: f32);
}

/// 布娃娃控制器
pub struct DynamicAnimControl {
    // ========== 配置 ==========
    link_configs: Vec<(String, LinkConfig)>,
    attachment_configs: Vec<(String, AttachmentConfig)>,
    torso_config: LinkConfig,
    /// 线性/角阻尼
    damping: f32,
    /// 低于该冲量的接触不通知监听者
    event_impulse_threshold: f32,
    /// ragdoll 模式使用的加速度
    gravity: Vec3,

    // ========== 构建后 ==========
    nodes: Option<ModelNodes>,
    links: Vec<PhysicsLink>,
    link_by_name: HashMap<String, LinkId>,
    link_by_body: HashMap<BodyId, LinkId>,
    /// 骨骼索引 -> 管理它的链接
    bone_managers: Vec<LinkId>,

    listeners: Vec<Box<dyn RagdollCollisionListener>>,
}

impl Default for DynamicAnimControl {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicAnimControl {
    /// 使用全局物理配置中的默认值创建
    pub fn new() -> Self {
        let config = get_config();
        Self {
            link_configs: Vec::new(),
            attachment_configs: Vec::new(),
            torso_config: LinkConfig {
                mass: config.torso_mass,
                shape: BodyShape::Ball { radius: 0.15 },
                ..LinkConfig::default()
            },
            damping: config.limb_damping,
            event_impulse_threshold: config.event_impulse_threshold,
            gravity: Vec3::new(0.0, config.gravity_y, 0.0),
            nodes: None,
            links: Vec::new(),
            link_by_name: HashMap::new(),
            link_by_body: HashMap::new(),
            bone_managers: Vec::new(),
            listeners: Vec::new(),
        }
    }

    // ========================================
    // 配置
    // ========================================

    /// 为骨骼创建链接（构建前）
    pub fn link(&mut self, bone: &str, config: LinkConfig) -> Result<()> {
        if self.is_built() {
            return Err(RagdollError::AlreadyBuilt);
        }
        if bone == TORSO_NAME {
            return Err(RagdollError::InvalidArgument(format!("{} 是保留名称", TORSO_NAME)));
        }
        validate_mass(bone, config.mass)?;
        if self.is_linked(bone) || self.attachment_configs.iter().any(|(k, _)| k == bone) {
            return Err(RagdollError::DuplicateLink(bone.to_string()));
        }
        self.link_configs.push((bone.to_string(), config));
        Ok(())
    }

    /// 添加附件（构建前）
    pub fn attach(&mut self, key: &str, config: AttachmentConfig) -> Result<()> {
        if self.is_built() {
            return Err(RagdollError::AlreadyBuilt);
        }
        validate_mass(key, config.mass)?;
        if key == TORSO_NAME || self.is_linked(key) || self.attachment_configs.iter().any(|(k, _)| k == key) {
            return Err(RagdollError::DuplicateLink(key.to_string()));
        }
        self.attachment_configs.push((key.to_string(), config));
        Ok(())
    }

    pub fn is_linked(&self, bone: &str) -> bool {
        self.link_configs.iter().any(|(name, _)| name == bone)
    }

    pub fn link_config(&self, bone: &str) -> Option<&LinkConfig> {
        self.link_configs.iter().find(|(name, _)| name == bone).map(|(_, c)| c)
    }

    pub fn linked_bone_names(&self) -> impl Iterator<Item = &str> {
        self.link_configs.iter().map(|(name, _)| name.as_str())
    }

    pub fn set_torso_config(&mut self, config: LinkConfig) -> Result<()> {
        validate_mass(TORSO_NAME, config.mass)?;
        self.torso_config = config;
        Ok(())
    }

    pub fn set_torso_mass(&mut self, mass: f32) -> Result<()> {
        validate_mass(TORSO_NAME, mass)?;
        self.torso_config.mass = mass;
        Ok(())
    }

    /// 只影响之后创建的刚体
    pub fn set_damping(&mut self, damping: f32) {
        self.damping = damping;
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    pub fn set_event_impulse_threshold(&mut self, threshold: f32) {
        self.event_impulse_threshold = threshold;
    }

    pub fn event_impulse_threshold(&self) -> f32 {
        self.event_impulse_threshold
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn add_collision_listener(&mut self, listener: Box<dyn RagdollCollisionListener>) {
        self.listeners.push(listener);
    }

    /// 骨骼的旋转范围
    pub fn get_joint_limits(&self, bone: &str) -> Result<RangeOfMotion> {
        self.link_config(bone)
            .map(|c| c.range_of_motion)
            .ok_or_else(|| RagdollError::LinkNotFound(bone.to_string()))
    }

    /// 链接直接驱动的骨骼：起始骨骼及其后代，遇到下一个已链接的骨骼即停止，前序
    ///
    /// 躯干（`TORSO_NAME`）从全部根骨骼开始。
    pub fn list_managed_bones(&self, skeleton: &Skeleton, link_name: &str) -> Result<Vec<usize>> {
        let starts: Vec<usize> = if link_name == TORSO_NAME {
            skeleton.roots().to_vec()
        } else {
            let bone = skeleton
                .find_bone(link_name)
                .ok_or_else(|| RagdollError::BoneNotFound(link_name.to_string()))?;
            if !self.is_linked(link_name) {
                return Err(RagdollError::LinkNotFound(link_name.to_string()));
            }
            vec![bone]
        };

        let mut result = Vec::new();
        let mut stack: Vec<usize> = starts.into_iter().rev().collect();
        while let Some(index) = stack.pop() {
            result.push(index);
            for &child in skeleton.bone(index).children.iter().rev() {
                if !self.is_linked(&skeleton.bone(child).name) {
                    stack.push(child);
                }
            }
        }
        Ok(result)
    }

    // ========================================
    // 构建 / 释放
    // ========================================

    pub fn is_built(&self) -> bool {
        self.nodes.is_some()
    }

    fn ensure_built(&self) -> Result<ModelNodes> {
        self.nodes.ok_or(RagdollError::NotBuilt)
    }

    /// mesh → 世界变换
    pub fn mesh_transform(&self, scene: &SceneGraph) -> Result<Transform> {
        Ok(self.ensure_built()?.mesh_to_world(scene))
    }

    /// 构建链接树
    ///
    /// `model` 为受控模型节点，`transformer` 为动画几何体节点（可以就是 `model`）。
    /// 刚体与关节在绑定姿态下创建，完成后恢复骨骼原来的姿态。
    /// 所有链接以 Kinematic/Animated、权重 1 开始。
    pub fn build(&mut self, ctx: &mut RagdollContext, model: NodeId, transformer: NodeId) -> Result<()> {
        if self.is_built() {
            return Err(RagdollError::AlreadyBuilt);
        }
        self.validate(ctx.skeleton)?;

        let nodes = ModelNodes { model, transformer };
        let mesh_to_model = ctx.scene.transform_relative_to(transformer, model)?.invert();

        let saved_pose: Vec<Transform> = (0..ctx.skeleton.len()).map(|i| ctx.skeleton.local_transform(i)).collect();
        ctx.skeleton.reset_and_update();
        let mesh_to_world = nodes.mesh_to_world(ctx.scene);

        let mut links: Vec<PhysicsLink> = Vec::new();
        let mut bone_managers = vec![LinkId(0); ctx.skeleton.len()];

        // ====== 躯干 ======
        let main_root = ctx.skeleton.roots()[0];
        let torso_offset = self
            .torso_config
            .offset
            .unwrap_or_else(|| default_offset(ctx.skeleton, main_root));
        let torso_managed = self.list_managed_bones(ctx.skeleton, TORSO_NAME)?;
        let transform = physics_from_bone(torso_offset, &ctx.skeleton.model_transform(main_root), &mesh_to_world);
        let body = self.create_body(ctx.space, self.torso_config.shape, self.torso_config.mass, transform);
        links.push(PhysicsLink::new(
            TORSO_NAME.to_string(),
            main_root,
            body,
            torso_offset,
            nodes,
            LinkKind::Torso(TorsoLink::new(torso_managed, mesh_to_model)),
        ));

        // ====== 骨骼链接（前序） ======
        let order: Vec<usize> = ctx
            .skeleton
            .roots()
            .to_vec()
            .into_iter()
            .flat_map(|root| ctx.skeleton.subtree(root))
            .collect();
        for bone in order {
            let name = ctx.skeleton.bone(bone).name.clone();
            let Some(config) = self.link_config(&name) else {
                continue;
            };

            let offset = config.offset.unwrap_or_else(|| default_offset(ctx.skeleton, bone));
            let transform = physics_from_bone(offset, &ctx.skeleton.model_transform(bone), &mesh_to_world);
            let body = self.create_body(ctx.space, config.shape, config.mass, transform);
            let managed = self.list_managed_bones(ctx.skeleton, &name)?;

            let id = LinkId(links.len());
            let parent_id = match ctx.skeleton.bone(bone).parent {
                Some(parent_bone) => bone_managers[parent_bone],
                None => LinkId(0),
            };
            for &m in &managed {
                bone_managers[m] = id;
            }

            let mut link = PhysicsLink::new(
                name,
                bone,
                body,
                offset,
                nodes,
                LinkKind::Bone(BoneLink::new(managed, config.range_of_motion)),
            );
            let parent = &links[parent_id.0];
            let parent_info = (parent_id, parent.body_id(), parent.physics_transform(ctx.skeleton, ctx.scene));
            link.add_joint(ctx.skeleton, ctx.scene, ctx.space, parent_info, &config.range_of_motion);
            links.push(link);
        }

        // ====== 附件 ======
        for (key, config) in &self.attachment_configs {
            let bone = ctx
                .skeleton
                .find_bone(&config.bone)
                .ok_or_else(|| RagdollError::BoneNotFound(config.bone.clone()))?;
            let transform = attachment_physics(
                config.offset,
                &ctx.scene.local_transform(config.node),
                &ctx.skeleton.model_transform(bone),
                &mesh_to_world,
            );
            let body = self.create_body(ctx.space, config.shape, config.mass, transform);

            let manager_id = bone_managers[bone];
            let mut link = PhysicsLink::new(
                key.clone(),
                bone,
                body,
                config.offset,
                nodes,
                LinkKind::Attachment(AttachmentLink::new(config.node)),
            );
            let manager = &links[manager_id.0];
            let parent_info = (manager_id, manager.body_id(), manager.physics_transform(ctx.skeleton, ctx.scene));
            link.add_joint(ctx.skeleton, ctx.scene, ctx.space, parent_info, &RangeOfMotion::default());
            links.push(link);
        }

        // ====== 恢复姿态，刚体移到当前姿态 ======
        for (index, transform) in saved_pose.into_iter().enumerate() {
            ctx.skeleton.set_local_transform(index, transform);
        }
        ctx.skeleton.update_model_transforms();
        ctx.skeleton.set_user_control_all(false);
        for link in &links {
            let transform = link.physics_transform(ctx.skeleton, ctx.scene);
            ctx.space.set_physics_transform(link.body_id(), &transform);
        }

        self.link_by_name = links.iter().enumerate().map(|(i, l)| (l.name().to_string(), LinkId(i))).collect();
        self.link_by_body = links.iter().enumerate().map(|(i, l)| (l.body_id(), LinkId(i))).collect();
        self.bone_managers = bone_managers;
        self.links = links;
        self.nodes = Some(nodes);

        log::info!(
            "[布娃娃] 构建完成: {} 链接 ({} 骨骼 + {} 附件), {} 关节, 总质量 {:.2}",
            self.links.len(),
            self.link_configs.len(),
            self.attachment_configs.len(),
            self.links.iter().filter(|l| l.joint().is_some()).count(),
            self.total_mass(ctx.space)
        );
        Ok(())
    }

    fn validate(&self, skeleton: &Skeleton) -> Result<()> {
        if skeleton.is_empty() {
            return Err(RagdollError::InvalidArgument("骨架为空".to_string()));
        }
        for (name, _) in &self.link_configs {
            let index = skeleton
                .find_bone(name)
                .ok_or_else(|| RagdollError::BoneNotFound(name.clone()))?;
            if skeleton.bone(index).is_root() {
                return Err(RagdollError::RootBoneLinked(name.clone()));
            }
        }
        for (_, config) in &self.attachment_configs {
            if skeleton.find_bone(&config.bone).is_none() {
                return Err(RagdollError::BoneNotFound(config.bone.clone()));
            }
        }
        Ok(())
    }

    fn create_body(&self, space: &mut PhysicsSpace, shape: BodyShape, mass: f32, transform: Transform) -> BodyHandle {
        space.add_rigid_body(&RigidBodyDesc {
            shape,
            mass,
            transform,
            kinematic: true,
            linear_damping: self.damping,
            angular_damping: self.damping,
            report_contacts: true,
        })
    }

    /// 移除全部关节与刚体
    pub fn detach(&mut self, ctx: &mut RagdollContext) {
        if !self.is_built() {
            return;
        }

        let count = self.links.len();
        for link in self.links.drain(..) {
            link.release(ctx.space);
        }
        self.link_by_name.clear();
        self.link_by_body.clear();
        self.bone_managers.clear();
        self.nodes = None;
        ctx.skeleton.set_user_control_all(false);

        log::info!("[布娃娃] 已释放 {} 个链接", count);
    }

    /// 重新构建（如模型缩放改变后），同名链接保留模式与过渡进度
    ///
    /// 刚体按新的缩放重新创建；恢复的刚体变换只取平移与旋转。
    pub fn rebuild(&mut self, ctx: &mut RagdollContext) -> Result<()> {
        let nodes = self.ensure_built()?;
        let states: Vec<LinkState> = self.links.iter().map(|l| l.state(ctx.space)).collect();

        self.detach(ctx);
        self.build(ctx, nodes.model, nodes.transformer)?;

        for mut state in states {
            let Some(id) = self.find_link(&state.name) else {
                continue;
            };
            state.body_transform.scale = ctx.space.physics_transform(self.links[id.0].body_id()).scale;
            if let Err(e) = self.links[id.0].apply_state(ctx, &state) {
                log::warn!("[布娃娃] 重建后无法恢复链接 {}: {}", state.name, e);
            }
        }
        Ok(())
    }

    // ========================================
    // 每帧
    // ========================================

    /// 按前序更新所有链接
    pub fn update(&mut self, ctx: &mut RagdollContext, tpf: f32) -> Result<()> {
        self.ensure_built()?;
        for link in &mut self.links {
            link.update(ctx, tpf);
        }
        Ok(())
    }

    /// 物理子步之前：运动学刚体跟随骨骼
    pub fn pre_physics_tick(&self, skeleton: &Skeleton, scene: &SceneGraph, space: &mut PhysicsSpace) {
        for link in &self.links {
            link.pre_physics_tick(skeleton, scene, space);
        }
    }

    /// 物理子步之后：分发接触事件
    pub fn post_physics_tick(&mut self, space: &mut PhysicsSpace) {
        self.dispatch_contacts(space);
    }

    /// 传给 `PhysicsSpace::step` 的回调
    pub fn tick_listener<'a>(&'a mut self, skeleton: &'a Skeleton, scene: &'a SceneGraph) -> RagdollTicker<'a> {
        RagdollTicker { control: self, skeleton, scene }
    }

    /// 取出物理空间的接触事件并通知监听者，返回通知的事件数
    pub fn dispatch_contacts(&mut self, space: &mut PhysicsSpace) -> usize {
        let events = space.drain_contact_events();
        self.notify_contacts(&events)
    }

    pub(crate) fn notify_contacts(&mut self, events: &[ContactEvent]) -> usize {
        let mut notified = 0;
        for event in events {
            if event.impulse < self.event_impulse_threshold {
                continue;
            }
            let link_a = event.body_a.and_then(|b| self.link_by_body.get(&b).copied());
            let link_b = event.body_b.and_then(|b| self.link_by_body.get(&b).copied());
            let (link, other) = match (link_a, link_b) {
                (Some(a), b) => (a, b),
                (None, Some(b)) => (b, None),
                (None, None) => {
                    log::debug!("[布娃娃] 忽略非布娃娃接触: 冲量 {:.3}", event.impulse);
                    continue;
                }
            };

            for listener in &mut self.listeners {
                listener.collide(&self.links[link.0], other.map(|o| &self.links[o.0]), event.impulse);
            }
            notified += 1;
        }
        notified
    }

    // ========================================
    // 全局模式切换
    // ========================================

    fn check_link(&self, id: LinkId) -> Result<()> {
        if id.0 < self.links.len() {
            Ok(())
        } else {
            Err(RagdollError::LinkNotFound(format!("#{}", id.0)))
        }
    }

    /// `root` 及其全部后代链接，前序
    pub fn subtree(&self, root: LinkId) -> Vec<LinkId> {
        let mut in_subtree = vec![false; self.links.len()];
        let mut result = Vec::new();
        for (index, link) in self.links.iter().enumerate().skip(root.0) {
            let member = index == root.0 || link.parent().is_some_and(|p| in_subtree[p.0]);
            if member {
                in_subtree[index] = true;
                result.push(LinkId(index));
            }
        }
        result
    }

    /// 直接子链接
    pub fn children(&self, id: LinkId) -> Vec<LinkId> {
        (0..self.links.len())
            .filter(|&i| self.links[i].parent() == Some(id))
            .map(LinkId)
            .collect()
    }

    /// 子树全部切换为动力学；`lock_all` 时骨骼链接的关节三轴锁在当前角度
    pub fn set_dynamic_subtree(
        &mut self,
        ctx: &mut RagdollContext,
        root: LinkId,
        acceleration: Vec3,
        lock_all: bool,
    ) -> Result<()> {
        self.ensure_built()?;
        self.check_link(root)?;
        let locks = if lock_all { AxisLock::ALL } else { AxisLock::empty() };

        for id in self.subtree(root) {
            let link = &mut self.links[id.0];
            if link.is_bone_link() {
                link.set_dynamic_locked(ctx, acceleration, locks)?;
            } else {
                link.set_dynamic(ctx, acceleration)?;
            }
        }
        Ok(())
    }

    /// 全部链接以重力进入动力学
    pub fn set_ragdoll_mode(&mut self, ctx: &mut RagdollContext) -> Result<()> {
        self.set_dynamic_subtree(ctx, LinkId(0), self.gravity, false)
    }

    /// 全部链接向运动学过渡；`end_model_transform` 只作用于躯干（模型节点）
    pub fn blend_to_kinematic_mode(
        &mut self,
        ctx: &mut RagdollContext,
        submode: KinematicSubmode,
        interval: f32,
        end_model_transform: Option<Transform>,
    ) -> Result<()> {
        self.ensure_built()?;
        for link in &mut self.links {
            let end = match link.kind() {
                LinkKind::Torso(_) => end_model_transform,
                _ => None,
            };
            link.blend_to_kinematic_mode(ctx, submode, interval, end)?;
        }
        Ok(())
    }

    /// 子树向运动学过渡
    pub fn blend_subtree(
        &mut self,
        ctx: &mut RagdollContext,
        root: LinkId,
        submode: KinematicSubmode,
        interval: f32,
    ) -> Result<()> {
        self.ensure_built()?;
        self.check_link(root)?;
        for id in self.subtree(root) {
            self.links[id.0].blend_to_kinematic_mode(ctx, submode, interval, None)?;
        }
        Ok(())
    }

    /// 截肢：子树过渡到 Amputated
    pub fn amputate_subtree(&mut self, ctx: &mut RagdollContext, root: LinkId, interval: f32) -> Result<()> {
        self.ensure_built()?;
        self.check_link(root)?;
        if !self.links[root.0].is_bone_link() {
            return Err(RagdollError::InvalidArgument(format!(
                "只能截断骨骼链接: {}",
                self.links[root.0].name()
            )));
        }
        self.blend_subtree(ctx, root, KinematicSubmode::Amputated, interval)
    }

    /// 冻结全部链接
    pub fn freeze(&mut self, ctx: &mut RagdollContext) -> Result<()> {
        self.ensure_built()?;
        for link in &mut self.links {
            link.freeze(ctx)?;
        }
        Ok(())
    }

    /// 修改骨骼链接的旋转范围并立即写入关节
    pub fn set_joint_limit(&mut self, ctx: &mut RagdollContext, bone: &str, range_of_motion: RangeOfMotion) -> Result<()> {
        self.ensure_built()?;
        let id = self
            .find_link(bone)
            .filter(|&id| self.links[id.0].is_bone_link())
            .ok_or_else(|| RagdollError::LinkNotFound(bone.to_string()))?;

        if let Some((_, config)) = self.link_configs.iter_mut().find(|(name, _)| name == bone) {
            config.range_of_motion = range_of_motion;
        }
        self.links[id.0].set_range_of_motion(ctx.space, range_of_motion)
    }

    // ========================================
    // 查询
    // ========================================

    pub fn find_link(&self, name: &str) -> Option<LinkId> {
        self.link_by_name.get(name).copied()
    }

    pub fn link_by_body(&self, body: BodyId) -> Option<LinkId> {
        self.link_by_body.get(&body).copied()
    }

    pub fn get_link(&self, id: LinkId) -> Option<&PhysicsLink> {
        self.links.get(id.0)
    }

    pub fn get_link_mut(&mut self, id: LinkId) -> Option<&mut PhysicsLink> {
        self.links.get_mut(id.0)
    }

    pub fn links(&self) -> &[PhysicsLink] {
        &self.links
    }

    pub fn torso(&self) -> Option<LinkId> {
        self.is_built().then_some(LinkId(0))
    }

    /// 管理某根骨骼的链接
    pub fn bone_manager(&self, bone: usize) -> Option<LinkId> {
        self.bone_managers.get(bone).copied()
    }

    pub fn total_mass(&self, space: &PhysicsSpace) -> f32 {
        self.links.iter().map(|l| space.mass(l.body_id())).sum()
    }

    // ========================================
    // 状态持久化
    // ========================================

    pub fn save_state(&self, space: &PhysicsSpace) -> Result<Vec<u8>> {
        self.ensure_built()?;
        let states: Vec<LinkState> = self.links.iter().map(|l| l.state(space)).collect();
        let mut capsule = OutputCapsule::new();
        capsule.write_savable_array("links", &states)?;
        Ok(capsule.into_bytes())
    }

    /// 恢复 `save_state` 的结果；链接结构必须一致
    pub fn restore_state(&mut self, ctx: &mut RagdollContext, bytes: &[u8]) -> Result<()> {
        self.ensure_built()?;
        let capsule = InputCapsule::from_bytes(bytes)?;
        let states: Vec<LinkState> = capsule.read_savable_array("links")?;
        let ids = states
            .iter()
            .map(|state| {
                self.find_link(&state.name)
                    .ok_or_else(|| RagdollError::LinkNotFound(state.name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        for (id, state) in ids.into_iter().zip(&states) {
            self.links[id.0].apply_state(ctx, state)?;
        }
        Ok(())
    }
}

impl Drop for DynamicAnimControl {
    fn drop(&mut self) {
        if !self.links.is_empty() {
            log::warn!(
                "[布娃娃] 控制器未 detach 就被释放: {} 个刚体仍留在物理空间中",
                self.links.len()
            );
        }
    }
}

/// `PhysicsSpace::step` 的回调适配器
pub struct RagdollTicker<'a> {
    control: &'a mut DynamicAnimControl,
    skeleton: &'a Skeleton,
    scene: &'a SceneGraph,
}

impl PhysicsTickListener for RagdollTicker<'_> {
    fn pre_physics_tick(&mut self, space: &mut PhysicsSpace, _time_step: f32) {
        self.control.pre_physics_tick(self.skeleton, self.scene, space);
    }

    fn post_physics_tick(&mut self, space: &mut PhysicsSpace, _time_step: f32) {
        self.control.post_physics_tick(space);
    }
}

fn validate_mass(name: &str, mass: f32) -> Result<()> {
    if mass.is_finite() && mass > 0.0 {
        Ok(())
    } else {
        Err(RagdollError::InvalidArgument(format!("{} 的质量无效: {}", name, mass)))
    }
}

/// 默认刚体偏移：到第一个子骨骼的中点，叶子骨骼为原点
fn default_offset(skeleton: &Skeleton, bone: usize) -> Vec3 {
    match skeleton.bone(bone).children.first() {
        Some(&child) => skeleton.bone(child).bind.translation * 0.5,
        None => Vec3::ZERO,
    }
}
