use crate::utils::error::ClassifyError;
use crate::Result;
use base64::Engine;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat, RgbImage};
use ndarray::Array3;
use std::fs;
use std::path::{Path, PathBuf};

/// 最大图像数据大小 (50MB)
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// 单次请求内解码得到的图像，不做缓存
#[derive(Debug, Clone)]
pub struct RawImage {
    image: DynamicImage,
}

impl RawImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn color(&self) -> ColorType {
        self.image.color()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }
}

pub struct ImageLoader;

impl ImageLoader {
    /// 从base64字符串加载图像
    pub fn from_base64(base64_data: &str) -> Result<RawImage> {
        // 检测并移除可能的数据URL前缀 (data:image/xxx;base64,)
        let base64_clean = match base64_data.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
            None => base64_data,
        };

        let image_bytes = base64::engine::general_purpose::STANDARD.decode(base64_clean.trim())?;

        Self::from_bytes(&image_bytes)
    }

    /// 从字节流加载图像
    pub fn from_bytes(bytes: &[u8]) -> Result<RawImage> {
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ClassifyError::FileTooLarge(bytes.len(), MAX_IMAGE_BYTES));
        }

        let image = image::load_from_memory(bytes)?;
        Self::validate(&image)?;

        Ok(RawImage::new(image))
    }

    /// 从文件路径加载图像
    pub fn from_path(path: &Path) -> Result<RawImage> {
        let image = image::open(path)?;
        Self::validate(&image)?;

        Ok(RawImage::new(image))
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Tiff
                | ImageFormat::WebP
        )
    }

    /// 转换为RGB的ndarray::Array3<f32> (HWC格式, 0-255)
    pub fn to_array3(image: &DynamicImage) -> Array3<f32> {
        let rgb_image = image.to_rgb8();
        let (width, height) = rgb_image.dimensions();

        Array3::from_shape_fn((height as usize, width as usize, 3), |(h, w, c)| {
            rgb_image.get_pixel(w as u32, h as u32)[c] as f32
        })
    }

    /// HWC格式的Array3<f32>转换回RGB图像，数值四舍五入并截断到0-255
    pub fn from_array3(array: &Array3<f32>) -> Result<RgbImage> {
        let (height, width, channels) = array.dim();
        if channels != 3 {
            return Err(ClassifyError::Internal(format!(
                "Expected 3 channels, got {}",
                channels
            )));
        }

        Ok(RgbImage::from_fn(width as u32, height as u32, |x, y| {
            let px = |c: usize| array[[y as usize, x as usize, c]].round().clamp(0.0, 255.0) as u8;
            image::Rgb([px(0), px(1), px(2)])
        }))
    }

    /// 验证图像尺寸和颜色模式
    pub fn validate(image: &DynamicImage) -> Result<()> {
        let (width, height) = image.dimensions();

        if width == 0 || height == 0 {
            return Err(ClassifyError::InvalidInput(format!(
                "Image has no pixels: {}x{}",
                width, height
            )));
        }

        if width > 16384 || height > 16384 {
            return Err(ClassifyError::InvalidInput(format!(
                "Image too large: {}x{}, maximum 16384x16384",
                width, height
            )));
        }

        // ColorType 为 non_exhaustive，新增的颜色类型不保证能转换为RGB
        match image.color() {
            ColorType::L8
            | ColorType::La8
            | ColorType::Rgb8
            | ColorType::Rgba8
            | ColorType::L16
            | ColorType::La16
            | ColorType::Rgb16
            | ColorType::Rgba16
            | ColorType::Rgb32F
            | ColorType::Rgba32F => Ok(()),
            other => Err(ClassifyError::UnsupportedColorMode(format!("{:?}", other))),
        }
    }
}

/// 受管图像目录：只允许访问目录内的文件
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 列出可用图像（按文件名排序）
    pub fn list(&self) -> Result<Vec<String>> {
        let mut images = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if Self::has_image_extension(&name) {
                images.push(name);
            }
        }

        images.sort();
        Ok(images)
    }

    /// 将图像ID解析为目录内路径
    pub fn path_of(&self, image_id: &str) -> Result<PathBuf> {
        let is_plain_name = !image_id.is_empty()
            && !image_id.contains(['/', '\\'])
            && image_id != "."
            && image_id != ".."
            && !image_id.starts_with('.');
        if !is_plain_name {
            return Err(ClassifyError::InvalidInput(format!(
                "Invalid image id '{}'",
                image_id
            )));
        }

        let path = self.root.join(image_id);
        if !path.is_file() {
            return Err(ClassifyError::InvalidInput(format!(
                "Image not found: {}",
                image_id
            )));
        }

        Ok(path)
    }

    pub fn open(&self, image_id: &str) -> Result<RawImage> {
        let path = self.path_of(image_id)?;
        ImageLoader::from_path(&path)
    }

    fn has_image_extension(name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ImageFormat::from_extension(ext))
            .is_some_and(ImageLoader::is_supported_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn decodes_png_bytes() {
        let image = ImageLoader::from_bytes(&png_bytes(4, 3)).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
        assert_eq!(image.color(), ColorType::Rgb8);
    }

    #[test]
    fn every_decodable_color_type_is_accepted() {
        let images = [
            DynamicImage::new_luma8(2, 2),
            DynamicImage::new_luma_a8(2, 2),
            DynamicImage::new_rgb8(2, 2),
            DynamicImage::new_rgba8(2, 2),
            DynamicImage::new_luma16(2, 2),
            DynamicImage::new_luma_a16(2, 2),
            DynamicImage::new_rgb16(2, 2),
            DynamicImage::new_rgba16(2, 2),
            DynamicImage::new_rgb32f(2, 2),
            DynamicImage::new_rgba32f(2, 2),
        ];
        for image in &images {
            assert!(ImageLoader::validate(image).is_ok(), "{:?}", image.color());
        }

        assert!(matches!(
            ImageLoader::validate(&DynamicImage::new_rgb8(0, 4)),
            Err(ClassifyError::InvalidInput(_))
        ));
    }

    #[test]
    fn garbage_bytes_are_decode_errors() {
        let result = ImageLoader::from_bytes(b"definitely not an image");
        assert!(matches!(result, Err(ClassifyError::ImageDecode(_))));
    }

    #[test]
    fn decodes_base64_with_data_url_prefix() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes(2, 2));
        let data_url = format!("data:image/png;base64,{}", encoded);

        assert!(ImageLoader::from_base64(&encoded).is_ok());
        assert!(ImageLoader::from_base64(&data_url).is_ok());
        assert!(matches!(
            ImageLoader::from_base64("***"),
            Err(ClassifyError::Base64(_))
        ));
    }

    #[test]
    fn array_round_trip_keeps_pixels() {
        let image = ImageLoader::from_bytes(&png_bytes(3, 2)).unwrap();
        let array = ImageLoader::to_array3(image.as_dynamic());
        assert_eq!(array.dim(), (2, 3, 3));
        assert_eq!(array[[1, 2, 0]], 200.0);

        let back = ImageLoader::from_array3(&array).unwrap();
        assert_eq!(back.get_pixel(2, 1).0, [200, 100, 50]);
    }

    #[test]
    fn store_lists_images_and_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.JPEG"), png_bytes(2, 2)).unwrap();
        fs::write(dir.path().join("a.png"), png_bytes(2, 2)).unwrap();
        fs::write(dir.path().join("imagenet_labels.json"), "[]").unwrap();

        let store = ImageStore::new(dir.path());
        assert_eq!(store.list().unwrap(), vec!["a.png", "b.JPEG"]);

        assert!(store.open("a.png").is_ok());
        assert!(matches!(
            store.open("../a.png"),
            Err(ClassifyError::InvalidInput(_))
        ));
        assert!(matches!(
            store.open("missing.png"),
            Err(ClassifyError::InvalidInput(_))
        ));
    }
}
