//! 二维图像的持久化存储.
//!
//! 交给训练端或用于人工检查. 所有图像均以 8-bit 单通道灰度图保存.

use super::min_max;
use super::window::HuWindow;
use image::{GrayImage, ImageResult, Luma};
use ndarray::{Array2, ArrayView2};
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 浮点图像在保存时会按自身的最小/最大值拉伸到 \[0, 255\].
/// 若图像是常数图 (最大值等于最小值), 则保存为全黑图.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 将 `[0, 1]` 之间的浮点值转换为灰度值, 越界值饱和截断.
#[inline]
pub(crate) fn unit_to_gray(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn stretch_to_gray(img: ArrayView2<f64>) -> GrayImage {
    let (height, width) = img.dim();
    let (lo, hi) = min_max(img.iter().copied()).unwrap_or((0.0, 0.0));
    let range = hi - lo;
    let mut buf = GrayImage::new(width as u32, height as u32);
    for ((h, w), &v) in img.indexed_iter() {
        let gray = if range > 0.0 && range.is_finite() {
            unit_to_gray((v - lo) / range)
        } else {
            0
        };
        buf.put_pixel(w as u32, h as u32, Luma([gray]));
    }
    buf
}

macro_rules! impl_float_vis {
    ($($img: ty),+) => {
        $(
            /// 按最小/最大值拉伸.
            impl ImgWriteVis for $img {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    stretch_to_gray(self.view()).save(path)
                }
            }
        )+
    };
}

impl_float_vis!(Array2<f64>, ArrayView2<'_, f64>);

/// 将取值在 `[0, 1]` 的图像 (如融合结果) 按原比例保存, 越界值饱和截断.
pub fn save_unit_range<P: AsRef<Path>>(img: ArrayView2<f64>, path: P) -> ImageResult<()> {
    let (height, width) = img.dim();
    let mut buf = GrayImage::new(width as u32, height as u32);
    for ((h, w), &v) in img.indexed_iter() {
        buf.put_pixel(w as u32, h as u32, Luma([unit_to_gray(v)]));
    }
    buf.save(path)
}

/// 将一张 HU 切片按窗口 `window` 映射后保存. 非有限值保存为黑色.
pub fn save_hu_slice<P: AsRef<Path>>(
    slice: ArrayView2<f32>,
    window: HuWindow,
    path: P,
) -> ImageResult<()> {
    let (height, width) = slice.dim();
    let mut buf = GrayImage::new(width as u32, height as u32);
    for ((h, w), &hu) in slice.indexed_iter() {
        let gray = window.eval(hu).unwrap_or(0);
        buf.put_pixel(w as u32, h as u32, Luma([gray]));
    }
    buf.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_unit_to_gray() {
        assert_eq!(unit_to_gray(0.0), 0);
        assert_eq!(unit_to_gray(1.0), 255);
        assert_eq!(unit_to_gray(-0.2), 0);
        assert_eq!(unit_to_gray(3.0), 255);
        assert_eq!(unit_to_gray(0.5), 128);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();

        let img = array![[1.0, 2.0], [3.0, 5.0]];
        let p = dir.path().join("stretch.png");
        img.save(&p).unwrap();
        let back = image::open(&p).unwrap().to_luma8();
        assert_eq!(back.get_pixel(0, 0).0[0], 0);
        assert_eq!(back.get_pixel(1, 1).0[0], 255);

        let p = dir.path().join("flat.png");
        Array2::<f64>::from_elem((3, 3), 7.0).save(&p).unwrap();
        let back = image::open(&p).unwrap().to_luma8();
        assert!(back.pixels().all(|px| px.0[0] == 0));

        let p = dir.path().join("unit.png");
        save_unit_range(array![[0.0, 1.0]].view(), &p).unwrap();
        let back = image::open(&p).unwrap().to_luma8();
        assert_eq!(back.dimensions(), (2, 1));
        assert_eq!(back.get_pixel(1, 0).0[0], 255);

        let p = dir.path().join("hu.png");
        let hu = array![[-2000.0_f32, 1000.0]];
        save_hu_slice(hu.view(), HuWindow::drr(), &p).unwrap();
        let back = image::open(&p).unwrap().to_luma8();
        assert_eq!(back.get_pixel(0, 0).0[0], 0);
        assert_eq!(back.get_pixel(1, 0).0[0], 255);
    }
}
