use anyhow::Result;
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device, Tensor};
use image::{imageops::FilterType, DynamicImage};

use crate::DeviceMap;

pub fn select_best_device(device_map: DeviceMap) -> Result<Device> {
    match device_map {
        DeviceMap::ForceCpu => Ok(Device::Cpu),
        DeviceMap::Ordinal(ordinal) if cuda_is_available() => Ok(Device::new_cuda(ordinal)?),
        DeviceMap::Ordinal(ordinal) if metal_is_available() => Ok(Device::new_metal(ordinal)?),
        DeviceMap::Ordinal(_) => {
            #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
            {
                log::warn!(
                    "Running on CPU, to run on GPU(metal), build with `--features metal`"
                );
            }
            #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
            {
                log::warn!("Running on CPU, to run on GPU, build with `--features cuda`");
            }
            Ok(Device::Cpu)
        }
    }
}

/// Converts a `u8` tensor with shape (3, height, width) into an RGB image.
pub fn tensor_to_image(img: &Tensor) -> Result<DynamicImage> {
    let (channels, height, width) = img.dims3()?;
    if channels != 3 {
        anyhow::bail!("tensor_to_image expects an image with 3 channels, got {channels}");
    }
    let img = img.permute((1, 2, 0))?.flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    let buffer = image::ImageBuffer::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| candle_core::Error::msg("error converting tensor to image buffer"))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

/// Resizes an image down to the nearest multiple of 8 on each side and turns it
/// into a (1, 3, height, width) tensor with values in [-1, 1].
pub fn image_to_tensor(img: &DynamicImage, device: &Device, dtype: DType) -> Result<Tensor> {
    let width = img.width() - img.width() % 8;
    let height = img.height() - img.height() % 8;
    if width == 0 || height == 0 {
        anyhow::bail!(
            "seed image {}x{} is smaller than 8x8",
            img.width(),
            img.height()
        );
    }
    let img = img
        .resize_exact(width, height, FilterType::CatmullRom)
        .to_rgb8();
    let pixels = img.into_raw();
    let tensor = Tensor::from_vec(pixels, (height as usize, width as usize, 3), &Device::Cpu)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(2. / 255., -1.)?
        .unsqueeze(0)?;
    Ok(tensor.to_device(device)?.to_dtype(dtype)?)
}
