use crate::image::RawImage;
use crate::utils::error::ClassifyError;
use crate::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// 缩放后单边允许的最大长度，超过时只缩放裁剪窗口
const MAX_RESIZED_SIDE: u32 = 4096;

/// ImageNet 预处理参数
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// 短边缩放到的长度
    pub resize_shorter: u32,
    /// 中心裁剪尺寸
    pub crop_size: u32,
    /// 各通道均值 (RGB)
    pub mean: [f32; 3],
    /// 各通道标准差 (RGB)
    pub std: [f32; 3],
    /// 缩放滤波器
    pub filter: FilterType,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize_shorter: 256,
            crop_size: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            filter: FilterType::Triangle,
        }
    }
}

/// 模型输入张量 [1, 3, H, W]，创建后不可修改
#[derive(Debug, Clone)]
pub struct PreprocessedTensor {
    data: Array4<f32>,
}

impl PreprocessedTensor {
    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            config: PreprocessConfig::default(),
        }
    }
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        if config.crop_size == 0 || config.crop_size > config.resize_shorter {
            return Err(ClassifyError::Config(format!(
                "Crop size {} must be in 1..={}",
                config.crop_size, config.resize_shorter
            )));
        }
        if let Some(s) = config.std.iter().find(|s| **s <= 0.0 || !s.is_finite()) {
            return Err(ClassifyError::Config(format!(
                "Standard deviation must be positive, got {}",
                s
            )));
        }
        Ok(Self { config })
    }

    /// RGB转换 → 短边缩放 → 中心裁剪 → 归一化
    pub fn preprocess(&self, image: &RawImage) -> Result<PreprocessedTensor> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(ClassifyError::InvalidInput(format!(
                "Cannot preprocess empty image {}x{}",
                width, height
            )));
        }

        let rgb = image.as_dynamic().to_rgb8();

        let (new_w, new_h) = Self::resized_dimensions(width, height, self.config.resize_shorter);
        let resized = if new_w.max(new_h) > MAX_RESIZED_SIDE {
            self.resize_crop_window(&rgb, new_w, new_h)
        } else {
            imageops::resize(&rgb, new_w, new_h, self.config.filter)
        };

        let crop = self.config.crop_size;
        let (left, top) = Self::center_crop_offsets(resized.width(), resized.height(), crop);
        let cropped = imageops::crop_imm(&resized, left, top, crop, crop).to_image();

        let PreprocessConfig { mean, std, .. } = self.config;
        let size = crop as usize;
        let data = Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            let value = cropped.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (value - mean[c]) / std[c]
        });

        tracing::debug!(
            "Preprocessed {}x{} image → resized {}x{} → tensor {:?}",
            width,
            height,
            new_w,
            new_h,
            data.shape()
        );

        Ok(PreprocessedTensor { data })
    }

    /// 短边缩放到 `shorter`，长边按比例向下取整
    pub fn resized_dimensions(width: u32, height: u32, shorter: u32) -> (u32, u32) {
        let (short, long) = if width <= height {
            (width, height)
        } else {
            (height, width)
        };
        let new_long = (shorter as u64 * long as u64 / short as u64) as u32;

        if width <= height {
            (shorter, new_long)
        } else {
            (new_long, shorter)
        }
    }

    /// 中心裁剪的左上角偏移，0.5 时按银行家舍入
    pub fn center_crop_offsets(width: u32, height: u32, crop: u32) -> (u32, u32) {
        (Self::crop_offset(width, crop), Self::crop_offset(height, crop))
    }

    fn crop_offset(dim: u32, crop: u32) -> u32 {
        (dim.saturating_sub(crop) as f64 / 2.0).round_ties_even() as u32
    }

    /// 只缩放落在中心裁剪区域内的源图像窗口
    ///
    /// 极端宽高比的图像（如 1x16384）整体缩放会产生数GB的中间图像。
    /// 超过 `MAX_RESIZED_SIDE` 的轴先在源图像上截取对应窗口，再按同一比例缩放。
    fn resize_crop_window(&self, rgb: &RgbImage, new_w: u32, new_h: u32) -> RgbImage {
        let crop = self.config.crop_size;
        let window = |src: u32, dst: u32| -> (u32, u32, u32) {
            if dst <= MAX_RESIZED_SIDE {
                return (0, src, dst);
            }
            let scale = dst as f64 / src as f64;
            let offset = Self::crop_offset(dst, crop) as f64;
            let start = ((offset / scale).floor() as u32).min(src - 1);
            let end = (((offset + crop as f64) / scale).ceil() as u32).clamp(start + 1, src);
            let len = end - start;
            let out = ((len as f64 * scale).round() as u32).max(crop);
            (start, len, out)
        };

        let (x, w, out_w) = window(rgb.width(), new_w);
        let (y, h, out_h) = window(rgb.height(), new_h);
        tracing::debug!(
            "Resizing {}x{} window at ({}, {}) to {}x{} instead of {}x{}",
            w,
            h,
            x,
            y,
            out_w,
            out_h,
            new_w,
            new_h
        );

        let view = imageops::crop_imm(rgb, x, y, w, h).to_image();
        imageops::resize(&view, out_w, out_h, self.config.filter)
    }
}
