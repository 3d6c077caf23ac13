#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 从带结节分割的 3D CT 体数据合成 2D 胸片结节块 (DRR),
//! 并将其以梯度域 (泊松) 融合的方式无缝植入宿主 2D 胸片.
//!
//! 该 crate 只负责可以完全在 CPU 上运行的确定性数据合成/融合变换,
//! 不涉及对抗网络训练、命令行参数解析和检查点读写.
//!
//! # 注意
//!
//! 1. 所有体数据按 `(z, h, w)` 组织, 与 nifti 原生的 `[W, H, z]` 相反.
//!   加载时自动转换.
//! 2. 所有中间结果都是内存中的 `ndarray` 缓冲区, 不会写入临时文件.
//! 3. 融合链路 (`composite`) 是整个系统唯一的 "尽力而为" 恢复点:
//!   融合失败时返回原宿主图像, 不会向上传播错误.
//!
//! # 开发计划
//!
//! ### 结节几何信息提取 ✅
//!
//! 二值化 + 连通域分析, 求外接矩形与直径. 多连通域时严格模式报错.
//!
//! 实现位于 `nodule-berry/src/geometry.rs`.
//!
//! ### 体数据重采样 ✅
//!
//! 按目标体素间距或目标形状缩放, 支持 0 ~ 5 阶样条插值,
//! 边界按 "nearest" 延拓. 插值阶数与数据类型不匹配时仅给出警告.
//!
//! 实现位于 `nodule-berry/src/resample`.
//!
//! ### DRR 投影 ✅
//!
//! HU 截断 -> 平移 -> 缩放 -> 指数衰减 -> 沿某轴取平均.
//!
//! 实现位于 `nodule-berry/src/drr.rs`.
//!
//! ### 对比度匹配 ✅
//!
//! 参考 Litjens 等人的做法, 并将结果下限截断为 0.4.
//!
//! 实现位于 `nodule-berry/src/contrast.rs`.
//!
//! ### 泊松图像编辑 ✅
//!
//! 稀疏拉普拉斯算子 + 共轭梯度求解, 支持普通/混合梯度两种引导场.
//!
//! 实现位于 `nodule-berry/src/poisson`.
//!
//! ### 病灶植入 ✅
//!
//! 紧致裁剪 -> 5x5 高斯模糊掩码 -> 以目标框中心做无缝融合.
//!
//! 实现位于 `nodule-berry/src/composite`.
//!
//! ### 结节块流水线 ✅
//!
//! 几何提取 -> 等比重采样 -> 掩蔽 -> 投影.
//!
//! 实现位于 `nodule-berry/src/pipeline.rs`.
//!
//! ### 数据读写 ✅
//!
//! nifti 体数据、宿主胸片读取; 结节块 npz 归档供训练端使用.
//!
//! 实现位于 `nodule-berry/src/dataset`.

/// 二维索引 (高, 宽), 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引 (z, 高, 宽), 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

type Area2d = Vec<Idx2d>;

/// 3D 体数据及相关基础结构.
mod data;

pub use data::{
    save, BoundingBox, HuWindow, ImgWriteVis, InvalidSpacing, Spacing, Volume, Voxel, VoxelKind,
};

pub mod consts;

pub mod composite;
pub mod contrast;
pub mod dataset;
pub mod drr;
pub mod geometry;
pub mod pipeline;
pub mod poisson;
pub mod prelude;
pub mod resample;
