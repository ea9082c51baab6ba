use crate::image::{ImageLoader, RawImage};
use crate::utils::error::ClassifyError;
use crate::Result;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use ndarray::{Array2, Array3};
use std::io::Cursor;

/// 增强因子上限
pub const MAX_FACTOR: f32 = 10.0;

/// 图像增强参数，1.0 表示不变
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceOptions {
    pub brightness: f32,
    pub contrast: f32,
    pub color: f32,
    pub sharpness: f32,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            color: 1.0,
            sharpness: 1.0,
        }
    }
}

impl EnhanceOptions {
    pub fn validate(&self) -> Result<()> {
        let factors = [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("color", self.color),
            ("sharpness", self.sharpness),
        ];
        for (name, value) in factors {
            if !value.is_finite() || !(0.0..=MAX_FACTOR).contains(&value) {
                return Err(ClassifyError::InvalidInput(format!(
                    "{} must be between 0 and {}, got {}",
                    name, MAX_FACTOR, value
                )));
            }
        }
        Ok(())
    }
}

/// 图像增强工具集
///
/// 每种增强都是 `degenerate + factor * (image - degenerate)`，结果截断到 0-255。
pub struct ImageEnhancer;

impl ImageEnhancer {
    /// 按 亮度 → 对比度 → 饱和度 → 锐度 的顺序应用增强
    ///
    /// 增强只作用于RGB通道；带透明通道的图像原样保留alpha，输出RGBA。
    pub fn enhance(image: &RawImage, options: &EnhanceOptions) -> Result<DynamicImage> {
        options.validate()?;

        let source = image.as_dynamic();
        let mut array = ImageLoader::to_array3(source);

        if options.brightness != 1.0 {
            array = Self::adjust_brightness(&array, options.brightness);
        }
        if options.contrast != 1.0 {
            array = Self::adjust_contrast(&array, options.contrast);
        }
        if options.color != 1.0 {
            array = Self::adjust_color(&array, options.color);
        }
        if options.sharpness != 1.0 {
            array = Self::adjust_sharpness(&array, options.sharpness);
        }

        let rgb = ImageLoader::from_array3(&array)?;
        if !source.color().has_alpha() {
            return Ok(DynamicImage::ImageRgb8(rgb));
        }

        let alpha = source.to_rgba8();
        let rgba = RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            Rgba([r, g, b, alpha.get_pixel(x, y)[3]])
        });
        Ok(DynamicImage::ImageRgba8(rgba))
    }

    /// 增强后编码为PNG
    pub fn enhance_to_png(image: &RawImage, options: &EnhanceOptions) -> Result<Vec<u8>> {
        let enhanced = Self::enhance(image, options)?;

        let mut buffer = Cursor::new(Vec::new());
        enhanced
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| ClassifyError::Internal(format!("PNG encoding failed: {}", e)))?;
        Ok(buffer.into_inner())
    }

    /// 亮度：与全黑图像混合
    pub fn adjust_brightness(image: &Array3<f32>, factor: f32) -> Array3<f32> {
        let degenerate = Array3::<f32>::zeros(image.dim());
        Self::blend(&degenerate, image, factor)
    }

    /// 对比度：与平均灰度的纯色图像混合
    pub fn adjust_contrast(image: &Array3<f32>, factor: f32) -> Array3<f32> {
        let mean = Self::luma(image).mean().unwrap_or(0.0);
        let degenerate = Array3::from_elem(image.dim(), (mean + 0.5).floor());
        Self::blend(&degenerate, image, factor)
    }

    /// 饱和度：与灰度图像混合
    pub fn adjust_color(image: &Array3<f32>, factor: f32) -> Array3<f32> {
        let luma = Self::luma(image);
        let degenerate = Array3::from_shape_fn(image.dim(), |(h, w, _)| luma[[h, w]]);
        Self::blend(&degenerate, image, factor)
    }

    /// 锐度：与3x3平滑滤波结果混合，边缘像素保持不变
    pub fn adjust_sharpness(image: &Array3<f32>, factor: f32) -> Array3<f32> {
        const KERNEL: [[f32; 3]; 3] = [[1.0, 1.0, 1.0], [1.0, 5.0, 1.0], [1.0, 1.0, 1.0]];
        const KERNEL_SUM: f32 = 13.0;

        let (height, width, channels) = image.dim();
        let mut degenerate = image.clone();

        if height >= 3 && width >= 3 {
            for h in 1..height - 1 {
                for w in 1..width - 1 {
                    for c in 0..channels {
                        let mut sum = 0.0;
                        for (dh, row) in KERNEL.iter().enumerate() {
                            for (dw, k) in row.iter().enumerate() {
                                sum += k * image[[h + dh - 1, w + dw - 1, c]];
                            }
                        }
                        degenerate[[h, w, c]] = (sum / KERNEL_SUM).round();
                    }
                }
            }
        }

        Self::blend(&degenerate, image, factor)
    }

    fn blend(degenerate: &Array3<f32>, image: &Array3<f32>, factor: f32) -> Array3<f32> {
        let mut blended = (image - degenerate) * factor + degenerate;
        blended.mapv_inplace(|v| v.round().clamp(0.0, 255.0));
        blended
    }

    /// ITU-R 601-2 亮度，取整到8位
    fn luma(image: &Array3<f32>) -> Array2<f32> {
        let (height, width, _) = image.dim();
        Array2::from_shape_fn((height, width), |(h, w)| {
            (0.299 * image[[h, w, 0]] + 0.587 * image[[h, w, 1]] + 0.114 * image[[h, w, 2]])
                .round()
        })
    }
}
