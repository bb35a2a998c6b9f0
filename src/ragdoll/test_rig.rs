//! 测试用的人形小骨架与场景

use glam::Vec3;

use crate::math::Transform;
use crate::physics::{BodyShape, PhysicsSpace};
use crate::scene::{NodeId, SceneGraph};
use crate::skeleton::Skeleton;

use super::{AttachmentConfig, DynamicAnimControl, LinkConfig, RagdollContext, RangeOfMotion};

pub(crate) const HIPS: usize = 0;
pub(crate) const SPINE: usize = 1;
pub(crate) const CHEST: usize = 2;
pub(crate) const THIGH_R: usize = 3;
pub(crate) const SHIN_R: usize = 4;
pub(crate) const FOOT_R: usize = 5;
pub(crate) const THIGH_L: usize = 6;
pub(crate) const SHIN_L: usize = 7;

pub(crate) const LINKED: [&str; 4] = ["Spine", "Thigh.R", "Shin.R", "Thigh.L"];

pub(crate) struct TestRig {
    pub skeleton: Skeleton,
    pub scene: SceneGraph,
    pub space: PhysicsSpace,
    pub model: NodeId,
    pub mesh: NodeId,
    pub sword: NodeId,
}

impl TestRig {
    pub fn new() -> Self {
        let mut skeleton = Skeleton::new();
        let t = |x: f32, y: f32, z: f32| Transform::from_translation(Vec3::new(x, y, z));
        skeleton.add_bone("Hips", None, t(0.0, 1.0, 0.0)).unwrap();
        skeleton.add_bone("Spine", Some("Hips"), t(0.0, 0.2, 0.0)).unwrap();
        skeleton.add_bone("Chest", Some("Spine"), t(0.0, 0.2, 0.0)).unwrap();
        skeleton.add_bone("Thigh.R", Some("Hips"), t(-0.1, -0.05, 0.0)).unwrap();
        skeleton.add_bone("Shin.R", Some("Thigh.R"), t(0.0, -0.4, 0.0)).unwrap();
        skeleton.add_bone("Foot.R", Some("Shin.R"), t(0.0, -0.4, 0.0)).unwrap();
        skeleton.add_bone("Thigh.L", Some("Hips"), t(0.1, -0.05, 0.0)).unwrap();
        skeleton.add_bone("Shin.L", Some("Thigh.L"), t(0.0, -0.4, 0.0)).unwrap();
        skeleton.reset_and_update();

        let mut scene = SceneGraph::new();
        let world = scene.add_node("world", None, t(0.0, 0.0, 1.0)).unwrap();
        let model = scene.add_node("model", Some(world), Transform::IDENTITY).unwrap();
        let mesh = scene.add_node("mesh", Some(model), t(0.0, 0.0, 0.25)).unwrap();
        let sword = scene.add_node("sword", None, t(0.0, -0.05, 0.1)).unwrap();

        Self { skeleton, scene, space: PhysicsSpace::new(), model, mesh, sword }
    }

    pub fn ctx(&mut self) -> RagdollContext<'_> {
        RagdollContext::new(&mut self.skeleton, &mut self.scene, &mut self.space)
    }

    /// 已配置但未构建的控制器
    pub fn configured_control(&self) -> DynamicAnimControl {
        let mut control = DynamicAnimControl::new();
        let shape = BodyShape::Ball { radius: 0.05 };
        for (i, bone) in LINKED.iter().enumerate() {
            let config = LinkConfig::new(1.0 + i as f32, shape, RangeOfMotion::symmetric(0.8, 0.4, 0.4));
            control.link(bone, config).unwrap();
        }
        control
            .attach("sword", AttachmentConfig::new("Foot.R", self.sword, 0.5, shape))
            .unwrap();
        control
    }

    /// 已构建的控制器
    pub fn control(&mut self) -> DynamicAnimControl {
        let mut control = self.configured_control();
        let (model, mesh) = (self.model, self.mesh);
        control.build(&mut self.ctx(), model, mesh).unwrap();
        control
    }

    /// 一帧：控制器 update 后推进物理
    pub fn step(&mut self, control: &mut DynamicAnimControl, tpf: f32) {
        control.update(&mut self.ctx(), tpf).unwrap();
        let mut ticker = control.tick_listener(&self.skeleton, &self.scene);
        self.space.step(tpf, &mut ticker);
    }

    pub fn teardown(&mut self, mut control: DynamicAnimControl) {
        control.detach(&mut self.ctx());
    }
}
