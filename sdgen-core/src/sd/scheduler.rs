use anyhow::Result;
use candle_transformers::models::stable_diffusion::{
    ddim::DDIMSchedulerConfig,
    euler_ancestral_discrete::EulerAncestralDiscreteSchedulerConfig,
    schedulers::{PredictionType, Scheduler, SchedulerConfig},
};
use serde::{Deserialize, Serialize};

/// Noise schedulers a pipeline can be built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    #[default]
    EulerAncestral,
    Ddim,
}

serde_plain::derive_display_from_serialize!(SchedulerKind);
serde_plain::derive_fromstr_from_deserialize!(SchedulerKind);

impl SchedulerKind {
    pub fn build(
        &self,
        prediction_type: PredictionType,
        steps: usize,
    ) -> Result<Box<dyn Scheduler>> {
        let scheduler = match self {
            SchedulerKind::EulerAncestral => EulerAncestralDiscreteSchedulerConfig {
                prediction_type,
                ..Default::default()
            }
            .build(steps)?,
            SchedulerKind::Ddim => DDIMSchedulerConfig {
                prediction_type,
                ..Default::default()
            }
            .build(steps)?,
        };
        Ok(scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_names() {
        assert_eq!("ddim".parse::<SchedulerKind>().unwrap(), SchedulerKind::Ddim);
        assert_eq!(
            "euler_ancestral".parse::<SchedulerKind>().unwrap(),
            SchedulerKind::EulerAncestral
        );
        assert!("pndm".parse::<SchedulerKind>().is_err());
    }

    #[test]
    fn builds_the_requested_number_of_timesteps() {
        for kind in [SchedulerKind::EulerAncestral, SchedulerKind::Ddim] {
            let scheduler = kind.build(PredictionType::Epsilon, 20).unwrap();
            assert_eq!(scheduler.timesteps().len(), 20);
        }
    }
}
