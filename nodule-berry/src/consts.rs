//! 通用常量.

/// 构造无缝融合用的均匀修正掩码时使用的强度. 取满强度 255,
/// 即掩码覆盖处完全采用源图的梯度.
pub const CORRECTION: u8 = 255;

/// 对比度因子的下限. 低于该值时合成结节在胸片上几乎不可见.
pub const CONTRAST_FLOOR: f64 = 0.4;

/// DRR 默认的 X 射线吸收增强系数.
pub const DEFAULT_P_LAMBDA: f64 = 0.85;

/// HU 值相关常量.
pub mod hu {
    /// DRR 投影前截断的 HU 下限.
    pub const DRR_LOWER: f32 = -500.0;

    /// DRR 投影前截断的 HU 上限.
    pub const DRR_UPPER: f32 = 400.0;

    /// 将 HU 值平移为非负衰减值的偏移量.
    pub const OFFSET: f64 = 1024.0;

    /// 衰减值归一化分母.
    pub const SCALE: f64 = 1000.0;
}

/// 重采样启发式规则相关常量.
pub mod heuristic {
    /// 标签掩码的最大取值. 超过该值的非负整型数据不被视为掩码.
    pub const MASK_MAX: f64 = 50.0;

    /// 扫描数据的最大取值需超过该值 (且最小值为负) 才会被视为 CT 扫描.
    pub const SCAN_MAX: f64 = 50.0;
}

/// 重采样支持的最高样条插值阶数.
pub const MAX_SPLINE_ORDER: usize = 5;

/// 高斯模糊核边长.
pub const BLUR_KERNEL: usize = 5;
