use anyhow::Result;
use candle_core::{Device, Shape, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Source of the Gaussian noise used for initial latents.
///
/// Accelerators are seeded through `Device::set_seed`. The CPU backend has no
/// seedable RNG, so a seeded `StdRng` draws the noise on the host instead.
pub(crate) struct LatentNoise {
    rng: Option<StdRng>,
}

impl LatentNoise {
    pub(crate) fn new(device: &Device, seed: Option<u64>) -> Result<Self> {
        let rng = match seed {
            Some(seed) if device.is_cpu() => Some(StdRng::seed_from_u64(seed)),
            Some(seed) => {
                device.set_seed(seed)?;
                None
            }
            None => None,
        };
        Ok(Self { rng })
    }

    /// Standard normal `f32` tensor of `shape` on `device`.
    pub(crate) fn randn<S: Into<Shape>>(&mut self, shape: S, device: &Device) -> Result<Tensor> {
        let shape = shape.into();
        let Some(rng) = self.rng.as_mut() else {
            return Ok(Tensor::randn(0f32, 1f32, shape, device)?);
        };
        let count = shape.elem_count();
        let mut values = Vec::with_capacity(count + 1);
        // Box-Muller, two samples per pair of uniforms.
        while values.len() < count {
            let u1: f32 = 1. - rng.random::<f32>();
            let u2: f32 = rng.random::<f32>();
            let radius = (-2. * u1.ln()).sqrt();
            let theta = 2. * std::f32::consts::PI * u2;
            values.push(radius * theta.cos());
            values.push(radius * theta.sin());
        }
        values.truncate(count);
        Ok(Tensor::from_vec(values, shape, device)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(seed: Option<u64>) -> Vec<f32> {
        let mut noise = LatentNoise::new(&Device::Cpu, seed).unwrap();
        noise
            .randn((1, 4, 3, 5), &Device::Cpu)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap()
    }

    #[test]
    fn seeding_the_cpu_does_not_fail() {
        assert!(LatentNoise::new(&Device::Cpu, Some(7)).is_ok());
    }

    #[test]
    fn same_seed_gives_same_cpu_latents() {
        let first = draw(Some(7));
        assert_eq!(first.len(), 60);
        assert_eq!(first, draw(Some(7)));
        assert_ne!(first, draw(Some(8)));
    }

    #[test]
    fn seeded_noise_is_roughly_standard_normal() {
        let mut noise = LatentNoise::new(&Device::Cpu, Some(42)).unwrap();
        let values: Vec<f32> = noise
            .randn(10_000, &Device::Cpu)
            .unwrap()
            .to_vec1()
            .unwrap();
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.).abs() < 0.1, "variance {var}");
    }

    #[test]
    fn unseeded_noise_has_the_requested_shape() {
        let mut noise = LatentNoise::new(&Device::Cpu, None).unwrap();
        let t = noise.randn((2, 3), &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[2, 3]);
    }
}
