//! 物理空间
//!
//! 封装 Rapier3D 的 PhysicsPipeline + RigidBodySet + ColliderSet + ImpulseJointSet。
//! 流程：每帧 step → [pre_physics_tick → 施加均匀加速度 → pipeline.step → post_physics_tick] × 子步数
//!
//! Rapier 刚体没有缩放，这里为每个刚体额外记录一份“影子缩放”，
//! 让物理变换与骨骼/场景变换一样是完整的 TRS。碰撞形状在创建刚体时按该缩放生成，
//! 之后缩放改变需要重新创建刚体（见 `DynamicAnimControl::rebuild`）。

use std::collections::HashMap;
use std::sync::Mutex;

use glam::{Quat, Vec3};
use rapier3d::na;
use rapier3d::prelude::*;

use crate::math::Transform;

use super::config::{get_config, PhysicsConfig};
use super::joint::{apply_angular_limits, relative_angles, SixDofJoint};

/// 刚体标识（可复制，用于查表）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyId(RigidBodyHandle);

/// 刚体所有权句柄
///
/// 不可复制：持有者负责通过 `PhysicsSpace::remove_rigid_body` 释放。
#[derive(Debug, PartialEq, Eq)]
pub struct BodyHandle {
    id: BodyId,
}

impl BodyHandle {
    #[inline]
    pub fn id(&self) -> BodyId {
        self.id
    }
}

/// 关节所有权句柄
#[derive(Debug, PartialEq, Eq)]
pub struct JointHandle {
    handle: ImpulseJointHandle,
}

/// 碰撞形状
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BodyShape {
    Ball { radius: f32 },
    Cuboid { half_extents: Vec3 },
    /// 沿局部 Y 轴的胶囊
    Capsule { half_height: f32, radius: f32 },
}

impl BodyShape {
    /// 按缩放调整尺寸；球取最大分量，胶囊长度取 Y、半径取 X/Z 的最大值
    pub fn scaled(&self, scale: Vec3) -> BodyShape {
        let scale = scale.abs();
        match *self {
            BodyShape::Ball { radius } => BodyShape::Ball { radius: radius * scale.max_element() },
            BodyShape::Cuboid { half_extents } => BodyShape::Cuboid { half_extents: half_extents * scale },
            BodyShape::Capsule { half_height, radius } => BodyShape::Capsule {
                half_height: half_height * scale.y,
                radius: radius * scale.x.max(scale.z),
            },
        }
    }

    fn collider_builder(&self) -> ColliderBuilder {
        match *self {
            BodyShape::Ball { radius } => ColliderBuilder::ball(radius),
            BodyShape::Cuboid { half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            BodyShape::Capsule { half_height, radius } => ColliderBuilder::capsule_y(half_height, radius),
        }
    }
}

/// 刚体创建参数
#[derive(Clone, Debug)]
pub struct RigidBodyDesc {
    /// 未缩放的形状，创建时按 `transform.scale` 缩放
    pub shape: BodyShape,
    /// 质量（0 表示静态刚体）
    pub mass: f32,
    pub transform: Transform,
    pub kinematic: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// 是否上报接触力事件
    pub report_contacts: bool,
}

/// 接触事件（冲量 = 接触力 × 子步时长）
#[derive(Clone, Copy, Debug)]
pub struct ContactEvent {
    pub body_a: Option<BodyId>,
    pub body_b: Option<BodyId>,
    pub impulse: f32,
}

/// 物理步进前后的回调
pub trait PhysicsTickListener {
    /// 每个子步之前调用
    fn pre_physics_tick(&mut self, space: &mut PhysicsSpace, time_step: f32);
    /// 每个子步之后调用
    fn post_physics_tick(&mut self, space: &mut PhysicsSpace, time_step: f32);
}

/// 不做任何事的监听者
impl PhysicsTickListener for () {
    fn pre_physics_tick(&mut self, _space: &mut PhysicsSpace, _time_step: f32) {}
    fn post_physics_tick(&mut self, _space: &mut PhysicsSpace, _time_step: f32) {}
}

/// 每个刚体在 Rapier 之外的附加数据
#[derive(Clone, Copy, Debug)]
struct BodyRecord {
    /// 创建时的碰撞形状（已缩放）
    shape: BodyShape,
    mass: f32,
    scale: Vec3,
    acceleration: Vec3,
}

/// 关节在 Rapier 之外的附加数据
#[derive(Clone, Debug)]
struct JointRecord {
    joint: SixDofJoint,
    parent: RigidBodyHandle,
    child: RigidBodyHandle,
}

/// 收集接触力事件
#[derive(Default)]
struct ContactCollector {
    events: Mutex<Vec<(ColliderHandle, ColliderHandle, f32)>>,
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
    }

    fn handle_contact_force_event(
        &self,
        dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        contact_pair: &ContactPair,
        total_force_magnitude: Real,
    ) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((contact_pair.collider1, contact_pair.collider2, total_force_magnitude * dt));
    }
}

/// 物理空间
pub struct PhysicsSpace {
    physics_pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    contacts: ContactCollector,

    /// 刚体附加数据
    bodies: HashMap<RigidBodyHandle, BodyRecord>,
    /// 关节附加数据
    joints: HashMap<ImpulseJointHandle, JointRecord>,

    /// 物理 FPS
    fps: f32,
    /// 最大子步数
    max_substep_count: i32,
    /// 未消耗的时间
    accumulator: f32,
    /// 默认重力（新刚体转为动力学时使用）
    gravity: Vec3,
}

impl PhysicsSpace {
    /// 使用全局配置创建
    pub fn new() -> Self {
        Self::with_config(&get_config())
    }

    pub fn with_config(config: &PhysicsConfig) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = 1.0 / config.physics_fps;
        if let Some(iterations) = std::num::NonZeroUsize::new(config.solver_iterations) {
            integration_parameters.num_solver_iterations = iterations;
        }

        if config.debug_log {
            log::info!(
                "[物理空间] 创建: FPS={}, 重力Y={}, 最大子步={}",
                config.physics_fps, config.gravity_y, config.max_substep_count
            );
        }

        Self {
            physics_pipeline: PhysicsPipeline::new(),
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            contacts: ContactCollector::default(),
            bodies: HashMap::new(),
            joints: HashMap::new(),
            fps: config.physics_fps,
            max_substep_count: config.max_substep_count,
            accumulator: 0.0,
            gravity: Vec3::new(0.0, config.gravity_y, 0.0),
        }
    }

    /// 默认重力
    #[inline]
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    /// 固定子步时长
    #[inline]
    pub fn time_step(&self) -> f32 {
        1.0 / self.fps
    }

    pub fn rigid_body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // ========================================
    // 刚体
    // ========================================

    /// 创建刚体并加入世界
    pub fn add_rigid_body(&mut self, desc: &RigidBodyDesc) -> BodyHandle {
        let body_type = if desc.mass <= 0.0 {
            RigidBodyType::Fixed
        } else if desc.kinematic {
            RigidBodyType::KinematicPositionBased
        } else {
            RigidBodyType::Dynamic
        };

        let body = RigidBodyBuilder::new(body_type)
            .position(to_isometry(desc.transform.translation, desc.transform.rotation))
            .linear_damping(desc.linear_damping)
            .angular_damping(desc.angular_damping)
            .build();
        let handle = self.rigid_body_set.insert(body);

        let shape = desc.shape.scaled(desc.transform.scale);
        let mut collider = shape.collider_builder();
        if desc.mass > 0.0 {
            collider = collider.mass(desc.mass);
        }
        if desc.report_contacts {
            collider = collider
                .active_events(ActiveEvents::CONTACT_FORCE_EVENTS)
                .contact_force_event_threshold(0.0);
        }
        self.collider_set
            .insert_with_parent(collider.build(), handle, &mut self.rigid_body_set);

        self.bodies.insert(
            handle,
            BodyRecord {
                shape,
                mass: desc.mass.max(0.0),
                scale: desc.transform.scale,
                acceleration: if desc.kinematic { Vec3::ZERO } else { self.gravity },
            },
        );
        BodyHandle { id: BodyId(handle) }
    }

    /// 从世界中移除刚体（连同其碰撞体与关节）
    pub fn remove_rigid_body(&mut self, body: BodyHandle) {
        let handle = body.id.0;
        self.joints.retain(|_, j| j.parent != handle && j.child != handle);
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.bodies.remove(&handle);
    }

    /// 碰撞形状（已按创建时的缩放调整）
    pub fn body_shape(&self, id: BodyId) -> Option<BodyShape> {
        self.bodies.get(&id.0).map(|r| r.shape)
    }

    pub fn contains_body(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id.0)
    }

    /// 物理变换（带影子缩放）
    pub fn physics_transform(&self, id: BodyId) -> Transform {
        let scale = self.bodies.get(&id.0).map_or(Vec3::ONE, |r| r.scale);
        match self.rigid_body_set.get(id.0) {
            Some(body) => {
                let (translation, rotation) = from_isometry(body.position());
                Transform::new(translation, rotation, scale)
            }
            None => Transform::IDENTITY,
        }
    }

    /// 立即设置物理变换（瞬移）
    pub fn set_physics_transform(&mut self, id: BodyId, transform: &Transform) {
        if let Some(record) = self.bodies.get_mut(&id.0) {
            record.scale = transform.scale;
        }
        if let Some(body) = self.rigid_body_set.get_mut(id.0) {
            body.set_position(to_isometry(transform.translation, transform.rotation), true);
        }
    }

    /// 设置运动学刚体下一子步的目标变换
    pub fn set_kinematic_target(&mut self, id: BodyId, transform: &Transform) {
        if let Some(record) = self.bodies.get_mut(&id.0) {
            record.scale = transform.scale;
        }
        if let Some(body) = self.rigid_body_set.get_mut(id.0) {
            body.set_next_kinematic_position(to_isometry(transform.translation, transform.rotation));
        }
    }

    /// 切换运动学/动力学
    pub fn set_kinematic(&mut self, id: BodyId, kinematic: bool) {
        if let Some(body) = self.rigid_body_set.get_mut(id.0) {
            if body.is_kinematic() == kinematic {
                return;
            }
            if kinematic {
                body.set_body_type(RigidBodyType::KinematicPositionBased, true);
            } else {
                body.set_body_type(RigidBodyType::Dynamic, true);
                body.set_linvel(na::Vector3::zeros(), true);
                body.set_angvel(na::Vector3::zeros(), true);
            }
        }
    }

    pub fn is_kinematic(&self, id: BodyId) -> bool {
        self.rigid_body_set.get(id.0).map_or(false, |b| b.is_kinematic())
    }

    /// 设置均匀加速度（替代世界重力，作用于该刚体）
    pub fn set_uniform_acceleration(&mut self, id: BodyId, acceleration: Vec3) {
        if let Some(record) = self.bodies.get_mut(&id.0) {
            record.acceleration = acceleration;
        }
    }

    pub fn uniform_acceleration(&self, id: BodyId) -> Vec3 {
        self.bodies.get(&id.0).map_or(Vec3::ZERO, |r| r.acceleration)
    }

    pub fn mass(&self, id: BodyId) -> f32 {
        self.bodies.get(&id.0).map_or(0.0, |r| r.mass)
    }

    pub fn set_damping(&mut self, id: BodyId, linear: f32, angular: f32) {
        if let Some(body) = self.rigid_body_set.get_mut(id.0) {
            body.set_linear_damping(linear);
            body.set_angular_damping(angular);
        }
    }

    pub fn linear_velocity(&self, id: BodyId) -> Vec3 {
        self.rigid_body_set
            .get(id.0)
            .map_or(Vec3::ZERO, |b| Vec3::new(b.linvel().x, b.linvel().y, b.linvel().z))
    }

    // ========================================
    // 关节
    // ========================================

    /// 在两个刚体之间创建关节
    pub fn add_joint(&mut self, parent: BodyId, child: BodyId, joint: SixDofJoint) -> JointHandle {
        let handle = self.impulse_joint_set.insert(parent.0, child.0, joint.build(), true);
        self.joints.insert(handle, JointRecord { joint, parent: parent.0, child: child.0 });
        JointHandle { handle }
    }

    pub fn remove_joint(&mut self, joint: JointHandle) {
        self.impulse_joint_set.remove(joint.handle, true);
        self.joints.remove(&joint.handle);
    }

    pub fn joint(&self, joint: &JointHandle) -> Option<&SixDofJoint> {
        self.joints.get(&joint.handle).map(|r| &r.joint)
    }

    /// 更新关节的旋转上下限
    pub fn set_joint_angular_limits(&mut self, joint: &JointHandle, lower: Vec3, upper: Vec3) {
        if let Some(record) = self.joints.get_mut(&joint.handle) {
            record.joint.set_angular_limits(lower, upper);
        }
        if let Some(impulse_joint) = self.impulse_joint_set.get_mut(joint.handle) {
            apply_angular_limits(&mut impulse_joint.data, lower, upper);
        }
    }

    /// 关节当前的相对转角（XYZ 欧拉角）
    pub fn joint_angles(&self, joint: &JointHandle) -> Vec3 {
        let Some(record) = self.joints.get(&joint.handle) else {
            return Vec3::ZERO;
        };
        let parent_rotation = self.physics_transform(BodyId(record.parent)).rotation;
        let child_rotation = self.physics_transform(BodyId(record.child)).rotation;
        relative_angles(parent_rotation, child_rotation, &record.joint.frames)
    }

    // ========================================
    // 步进
    // ========================================

    /// 按固定子步推进 `delta_time` 秒
    ///
    /// 超过最大子步数的剩余时间被丢弃，避免卡顿后追帧。返回实际执行的子步数。
    pub fn step(&mut self, delta_time: f32, listener: &mut dyn PhysicsTickListener) -> usize {
        let fixed_dt = self.time_step();
        self.accumulator += delta_time.max(0.0);

        let mut substeps = 0usize;
        while self.accumulator >= fixed_dt && (substeps as i32) < self.max_substep_count {
            self.single_step(listener);
            self.accumulator -= fixed_dt;
            substeps += 1;
        }
        if substeps as i32 >= self.max_substep_count {
            self.accumulator = 0.0;
        }
        substeps
    }

    /// 执行恰好一个固定子步
    ///
    /// 上一子步未被取走的接触事件在子步开始时丢弃，需要事件的调用方在 `post_physics_tick` 中取出。
    pub fn single_step(&mut self, listener: &mut dyn PhysicsTickListener) {
        let fixed_dt = self.time_step();
        self.contacts.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
        listener.pre_physics_tick(self, fixed_dt);

        self.apply_uniform_accelerations();
        self.integration_parameters.dt = fixed_dt;
        self.physics_pipeline.step(
            &na::Vector3::zeros(),
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &self.contacts,
        );

        listener.post_physics_tick(self, fixed_dt);
    }

    /// 世界重力为零，每个动力学刚体以 F = m·a 模拟各自的均匀加速度
    fn apply_uniform_accelerations(&mut self) {
        for (handle, record) in &self.bodies {
            if let Some(body) = self.rigid_body_set.get_mut(*handle) {
                if !body.is_dynamic() {
                    continue;
                }
                let force = record.acceleration * record.mass;
                body.reset_forces(false);
                body.add_force(na::Vector3::new(force.x, force.y, force.z), true);
            }
        }
    }

    /// 取出累积的接触事件
    pub fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        let raw = std::mem::take(&mut *self.contacts.events.lock().unwrap_or_else(|e| e.into_inner()));
        raw.into_iter()
            .map(|(c1, c2, impulse)| ContactEvent {
                body_a: self.collider_set.get(c1).and_then(|c| c.parent()).map(BodyId),
                body_b: self.collider_set.get(c2).and_then(|c| c.parent()).map(BodyId),
                impulse,
            })
            .collect()
    }
}

impl Default for PhysicsSpace {
    fn default() -> Self {
        Self::new()
    }
}

// ========================================
// glam <-> nalgebra
// ========================================

pub(crate) fn to_isometry(translation: Vec3, rotation: Quat) -> Isometry<Real> {
    let q = rotation.normalize();
    na::Isometry3::from_parts(
        na::Translation3::new(translation.x, translation.y, translation.z),
        na::UnitQuaternion::from_quaternion(na::Quaternion::new(q.w, q.x, q.y, q.z)),
    )
}

pub(crate) fn from_isometry(iso: &Isometry<Real>) -> (Vec3, Quat) {
    let t = iso.translation.vector;
    let q = iso.rotation.quaternion();
    (Vec3::new(t.x, t.y, t.z), Quat::from_xyzw(q.i, q.j, q.k, q.w))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball(transform: Transform, kinematic: bool) -> RigidBodyDesc {
        RigidBodyDesc {
            shape: BodyShape::Ball { radius: 0.1 },
            mass: 1.0,
            transform,
            kinematic,
            linear_damping: 0.0,
            angular_damping: 0.0,
            report_contacts: false,
        }
    }

    #[test]
    fn test_isometry_round_trip() {
        let rotation = Quat::from_rotation_y(0.8);
        let (t, r) = from_isometry(&to_isometry(Vec3::new(1.0, 2.0, 3.0), rotation));
        assert!(t.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        assert!(r.abs_diff_eq(rotation, 1e-6));
    }

    #[test]
    fn test_dynamic_body_uses_uniform_acceleration() {
        let mut space = PhysicsSpace::with_config(&PhysicsConfig::default());
        let body = space.add_rigid_body(&ball(Transform::IDENTITY, false));
        space.set_uniform_acceleration(body.id(), Vec3::new(0.0, 0.0, 5.0));

        for _ in 0..10 {
            space.single_step(&mut ());
        }
        let t = space.physics_transform(body.id());
        assert!(t.translation.z > 0.0);
        assert!(t.translation.y.abs() < 1e-4);
    }

    #[test]
    fn test_kinematic_body_ignores_acceleration() {
        let mut space = PhysicsSpace::with_config(&PhysicsConfig::default());
        let start = Transform::new(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY, Vec3::splat(2.0));
        let body = space.add_rigid_body(&ball(start, true));
        space.single_step(&mut ());

        assert!(space.is_kinematic(body.id()));
        let t = space.physics_transform(body.id());
        assert!(t.translation.abs_diff_eq(start.translation, 1e-5));
        // 影子缩放保留
        assert!(t.scale.abs_diff_eq(Vec3::splat(2.0), 1e-6));
    }

    #[test]
    fn test_step_respects_max_substeps() {
        let config = PhysicsConfig::default();
        let mut space = PhysicsSpace::with_config(&config);
        let n = space.step(10.0, &mut ());
        assert_eq!(n as i32, config.max_substep_count);
        assert_eq!(space.step(0.0, &mut ()), 0);
    }

    #[test]
    fn test_remove_body_releases_joint() {
        let mut space = PhysicsSpace::with_config(&PhysicsConfig::default());
        let a = space.add_rigid_body(&ball(Transform::IDENTITY, true));
        let b = space.add_rigid_body(&ball(Transform::from_translation(Vec3::Y), false));
        let frames = crate::math::coords::pivot_frames(
            Vec3::new(0.0, 0.5, 0.0),
            &space.physics_transform(a.id()),
            &space.physics_transform(b.id()),
        );
        let _joint = space.add_joint(a.id(), b.id(), SixDofJoint::new(frames));
        assert_eq!(space.joint_count(), 1);

        space.remove_rigid_body(b);
        assert_eq!(space.joint_count(), 0);
        assert_eq!(space.rigid_body_count(), 1);
    }

    #[test]
    fn test_shape_follows_creation_scale() {
        let mut space = PhysicsSpace::with_config(&PhysicsConfig::default());
        let scaled = Transform::new(Vec3::ZERO, Quat::IDENTITY, Vec3::splat(2.0));
        let body = space.add_rigid_body(&ball(scaled, true));
        assert_eq!(space.body_shape(body.id()), Some(BodyShape::Ball { radius: 0.2 }));

        let capsule = BodyShape::Capsule { half_height: 0.5, radius: 0.1 }.scaled(Vec3::new(3.0, 2.0, -4.0));
        assert_eq!(capsule, BodyShape::Capsule { half_height: 1.0, radius: 0.4 });
        let cuboid = BodyShape::Cuboid { half_extents: Vec3::ONE }.scaled(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(cuboid, BodyShape::Cuboid { half_extents: Vec3::new(1.0, 2.0, 3.0) });
    }

    #[test]
    fn test_undrained_contacts_do_not_accumulate() {
        let mut space = PhysicsSpace::with_config(&PhysicsConfig::default());
        let mut ground = ball(Transform::IDENTITY, false);
        ground.shape = BodyShape::Cuboid { half_extents: Vec3::new(2.0, 0.1, 2.0) };
        ground.mass = 0.0;
        ground.report_contacts = true;
        space.add_rigid_body(&ground);

        let mut falling = ball(Transform::from_translation(Vec3::new(0.0, 0.19, 0.0)), false);
        falling.report_contacts = true;
        space.add_rigid_body(&falling);

        for _ in 0..120 {
            space.step(1.0 / 60.0, &mut ());
        }
        // 只剩最后一个子步的事件
        assert!(space.drain_contact_events().len() <= 1);
    }
}
