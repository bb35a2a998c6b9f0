//! 错误类型

use thiserror::Error;

/// 布娃娃运行时错误
///
/// 配置错误（骨骼名不存在、在构建前设置关节限制等）立即返回，不做重试。
#[derive(Debug, Error)]
pub enum RagdollError {
    #[error("骨骼不存在: {0}")]
    BoneNotFound(String),

    #[error("根骨骼由躯干链接管理，不能单独链接: {0}")]
    RootBoneLinked(String),

    #[error("重复的链接: {0}")]
    DuplicateLink(String),

    #[error("链接不存在: {0}")]
    LinkNotFound(String),

    #[error("布娃娃尚未构建")]
    NotBuilt,

    #[error("布娃娃已经构建，需先 detach")]
    AlreadyBuilt,

    #[error("参数无效: {0}")]
    InvalidArgument(String),

    #[error("胶囊缺少字段: {0}")]
    MissingField(String),

    #[error("胶囊数据损坏: {0}")]
    Capsule(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// crate 内统一的 Result
pub type Result<T> = std::result::Result<T, RagdollError>;
