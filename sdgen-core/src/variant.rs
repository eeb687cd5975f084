use candle_transformers::models::stable_diffusion::{
    schedulers::PredictionType, StableDiffusionConfig,
};

/// Stable Diffusion releases the loader knows how to configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    V1_5,
    /// The 768px v-prediction release.
    V2_1,
    /// The 512px epsilon-prediction release.
    V2_1Base,
}

impl ModelVariant {
    /// Detect model variant from model name
    pub fn from_name(model_name: &str) -> Option<Self> {
        let name = model_name.to_lowercase();

        if name.contains("2-1") || name.contains("2.1") {
            if name.contains("base") {
                Some(ModelVariant::V2_1Base)
            } else {
                Some(ModelVariant::V2_1)
            }
        } else if name.contains("v1-5") || name.contains("1.5") {
            Some(ModelVariant::V1_5)
        } else {
            None
        }
    }

    pub fn sd_config(&self, sliced_attention_size: Option<usize>) -> StableDiffusionConfig {
        match self {
            ModelVariant::V1_5 => StableDiffusionConfig::v1_5(sliced_attention_size, None, None),
            ModelVariant::V2_1 => StableDiffusionConfig::v2_1(sliced_attention_size, None, None),
            ModelVariant::V2_1Base => {
                StableDiffusionConfig::v2_1(sliced_attention_size, Some(512), Some(512))
            }
        }
    }

    pub fn prediction_type(&self) -> PredictionType {
        match self {
            ModelVariant::V2_1 => PredictionType::VPrediction,
            ModelVariant::V1_5 | ModelVariant::V2_1Base => PredictionType::Epsilon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_variants_from_repo_ids() {
        assert_eq!(
            ModelVariant::from_name("stabilityai/stable-diffusion-2-1-base"),
            Some(ModelVariant::V2_1Base)
        );
        assert_eq!(
            ModelVariant::from_name("stabilityai/stable-diffusion-2-1"),
            Some(ModelVariant::V2_1)
        );
        assert_eq!(
            ModelVariant::from_name("runwayml/stable-diffusion-v1-5"),
            Some(ModelVariant::V1_5)
        );
        assert_eq!(ModelVariant::from_name("black-forest-labs/FLUX.1-schnell"), None);
    }

    #[test]
    fn only_the_768_release_predicts_velocity() {
        assert!(matches!(
            ModelVariant::V2_1.prediction_type(),
            PredictionType::VPrediction
        ));
        assert!(matches!(
            ModelVariant::V2_1Base.prediction_type(),
            PredictionType::Epsilon
        ));
    }
}
