//! 数据集操作: 体数据/宿主图像读取, 以及结节块归档.

use std::env;
use std::path::{Path, PathBuf};

use log::warn;
use ndarray::{Array2, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};

use crate::{Spacing, Volume, Voxel};

pub mod generic;
mod npz_archive;

pub use generic::{pair_loader, FilenameBuilder, PairLoader};
pub use npz_archive::{ArchiveError, ArchiveResult, PatchArchive, PatchWriter};

/// 指定数据集根目录的环境变量.
pub const DATASET_DIR_ENV: &str = "NODULE_DATASET_DIR";

/// 读取体数据或图像时的错误.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// nifti 解析错误.
    #[error("读取 nifti 文件失败: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 体数据不是三维的.
    #[error("体数据维度不符: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// 图像读取错误.
    #[error("读取图像失败: {0}")]
    Image(#[from] image::ImageError),
}

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 获取数据集根目录.
///
/// 1. 若环境变量 `$NODULE_DATASET_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset`. 无法确定主目录时返回 `None`.
pub fn dataset_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var(DATASET_DIR_ENV) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir(),
    }
}

/// 打开 nii 格式的 3D 体数据, 并转换为 `(z, h, w)` 布局.
///
/// 体素间距取自文件头的 `pixdim`, 同样按 `(z, h, w)` 排列.
/// 文件头中的间距非法 (如为 0) 时使用单位间距并打印警告.
pub fn open_volume<T: Voxel, P: AsRef<Path>>(path: P) -> Result<Volume<T>, LoadError> {
    let obj = ReaderOptions::new().read_file(path.as_ref())?;
    let [_, w, h, z, ..] = obj.header().pixdim;

    // [W, H, z] -> [z, H, W].
    // hint: 原第一维向下增长, 原第二维向右增长.
    let data = obj
        .into_volume()
        .into_ndarray::<f32>()?
        .permuted_axes([2, 1, 0].as_slice())
        .into_dimensionality::<Ix3>()?
        .mapv(|v| T::from_f64(v as f64));

    let spacing = Spacing::new([z as f64, h as f64, w as f64]).unwrap_or_else(|e| {
        warn!("{}: {e}, 改用单位间距", path.as_ref().display());
        Spacing::unit()
    });
    Ok(Volume::new(data, spacing))
}

/// 读取灰度宿主图像, 强度映射到 `[0, 1]`.
pub fn open_host_image<P: AsRef<Path>>(path: P) -> Result<Array2<f64>, LoadError> {
    let img = image::open(path)?.into_luma16();
    let (w, h) = img.dimensions();
    Ok(Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32).0[0] as f64 / u16::MAX as f64
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImgWriteVis;

    #[test]
    fn test_home_dataset_dir_with() {
        if let Some(base) = home_dataset_dir() {
            let p = home_dataset_dir_with(["lidc", "0001"]).unwrap();
            assert_eq!(p, base.join("lidc").join("0001"));
        }
    }

    #[test]
    fn test_host_image_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.png");
        let img = Array2::from_shape_fn((4, 6), |(y, x)| (y * 6 + x) as f64);
        img.save(&path).unwrap();

        let back = open_host_image(&path).unwrap();
        assert_eq!(back.dim(), (4, 6));
        assert_eq!(back[(0, 0)], 0.0);
        assert_eq!(back[(3, 5)], 1.0);
        assert!(back.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_missing_files() {
        assert!(open_volume::<i16, _>("/definitely/not/here.nii.gz").is_err());
        assert!(matches!(
            open_host_image("/definitely/not/here.png"),
            Err(LoadError::Image(_))
        ));
    }
}
