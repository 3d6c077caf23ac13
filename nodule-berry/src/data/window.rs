/// HU 窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HuWindow {
    level: f32,
    width: f32,
}

impl HuWindow {
    /// 构建 HU 窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<HuWindow> {
        if (-1e5..=1e5).contains(&level) && 0.0 < width && width <= 1e5 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// DRR 投影前使用的截断窗口, 即 \[-500, 400\] HU. 窗位 -50, 窗宽 900.
    #[inline]
    pub const fn drr() -> HuWindow {
        Self {
            level: -50.0,
            width: 900.0,
        }
    }

    /// 便于观察肺部结节的窗口. 窗位 -600, 窗宽 1500.
    #[inline]
    pub const fn from_lung_visual() -> HuWindow {
        Self {
            level: -600.0,
            width: 1500.0,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 将 `hu` 截断到 \[下限, 上限\]. `NaN` 原样返回.
    #[inline]
    pub fn clip(&self, hu: f32) -> f32 {
        hu.clamp(self.lower_bound(), self.upper_bound())
    }

    /// 求在当前窗设置下, `hu` 对应的灰度图像素整数值 (0 <= value <= 255)
    ///
    /// 如果 `hu` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, hu: f32) -> Option<u8> {
        if !hu.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        if hu <= lb {
            Some(u8::MIN)
        } else if hu >= self.upper_bound() {
            Some(u8::MAX)
        } else {
            // 255, not 256.
            Some((((hu - lb) / self.width()) * 255.0) as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HuWindow;

    fn is_valid_init(level: f32, width: f32) -> bool {
        HuWindow::new(level, width).is_some()
    }

    #[test]
    fn test_hu_window_invalid_input() {
        assert!(!is_valid_init(0.0, -1.0));
        assert!(!is_valid_init(0.0, 0.0));
        assert!(!is_valid_init(1e6, 10.0));
    }

    #[test]
    fn test_drr_window_bounds() {
        use crate::consts::hu::{DRR_LOWER, DRR_UPPER};

        let w = HuWindow::drr();
        assert_eq!(w.lower_bound(), DRR_LOWER);
        assert_eq!(w.upper_bound(), DRR_UPPER);
        assert_eq!(w.clip(-1000.0), -500.0);
        assert_eq!(w.clip(3000.0), 400.0);
        assert_eq!(w.clip(12.5), 12.5);
    }

    #[test]
    fn test_hu_window_eval() {
        // [-1350, 150]
        let w = HuWindow::from_lung_visual();
        assert_eq!(w.eval(f32::NAN), None);
        assert_eq!(w.eval(f32::MIN), Some(0));
        assert_eq!(w.eval(f32::MAX), Some(255));
        assert_eq!(w.eval(-1350.0), Some(0));
        assert_eq!(w.eval(150.0), Some(255));
        assert_eq!(w.eval(-600.0), Some((255.0 * 0.5) as u8));
    }
}
