//! 泊松融合运行时错误.

use crate::Idx2d;

/// 泊松融合错误.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BlendError {
    /// 掩码形状与目标图像不一致.
    #[error("掩码形状 {mask:?} 与目标图像形状 {target:?} 不一致")]
    ShapeMismatch {
        /// 掩码形状.
        mask: Idx2d,

        /// 目标图像 (高, 宽).
        target: Idx2d,
    },

    /// 源图像与目标图像通道数不兼容. 源图像只能是单通道或与目标通道数相同.
    #[error("源图像有 {source_channels} 个通道, 目标图像有 {target_channels} 个通道")]
    ChannelMismatch {
        /// 源图像通道数.
        source_channels: usize,

        /// 目标图像通道数.
        target_channels: usize,
    },

    /// 输入中存在 `NaN` 或无穷值.
    #[error("输入图像中存在非有限值")]
    NonFinite,

    /// 线性方程组求解未收敛.
    #[error("第 {channel} 通道求解未收敛, 迭代 {iterations} 次后残差为 {residual:e}")]
    NotConverged {
        /// 通道索引.
        channel: usize,

        /// 迭代次数.
        iterations: usize,

        /// 最终残差.
        residual: f64,
    },
}
