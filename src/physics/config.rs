//! 物理配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。
//! 这里只提供默认值；物理空间本身总是显式传入，不存在全局的“当前物理空间”。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 物理配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    // ========== 重力 ==========
    /// 重力 Y 分量（负数向下），默认 -9.81
    pub gravity_y: f32,

    // ========== 模拟参数 ==========
    /// 物理 FPS，默认 60.0
    pub physics_fps: f32,
    /// 每帧最大子步数，默认 4
    pub max_substep_count: i32,
    /// 求解器迭代次数，默认 8
    pub solver_iterations: usize,

    // ========== 布娃娃 ==========
    /// 肢体刚体的线性/角阻尼，默认 0.6
    pub limb_damping: f32,
    /// 躯干刚体质量，默认 15.0
    pub torso_mass: f32,
    /// 碰撞事件分发的冲量阈值，低于此值的接触不通知监听者，默认 0.0
    pub event_impulse_threshold: f32,

    // ========== 调试 ==========
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            // ====== 重力 ======
            gravity_y: -9.81,

            // ====== 模拟参数 ======
            // 越高 → 模拟越精确，但 CPU 消耗越大
            physics_fps: 60.0,
            max_substep_count: 4,
            solver_iterations: 8,

            // ====== 布娃娃 ======
            limb_damping: 0.6,
            torso_mass: 15.0,
            event_impulse_threshold: 0.0,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局配置实例
static PHYSICS_CONFIG: Lazy<RwLock<PhysicsConfig>> = Lazy::new(|| {
    RwLock::new(PhysicsConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> PhysicsConfig {
    PHYSICS_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: PhysicsConfig) {
    *PHYSICS_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *PHYSICS_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = PhysicsConfig::default();
}
