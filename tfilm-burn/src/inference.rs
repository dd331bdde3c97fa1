use std::path::Path;

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};
use tracing::{debug, info};

use crate::{
    error::{Result, TfilmError},
    model::{TfilmConfig, TfilmNet},
    spline::spline_upsample,
};

/// Inference context: a configured network on its device.
///
/// Turns a low-resolution clip into a high-resolution estimate by spline upsampling
/// followed by a single network pass.
#[derive(Debug)]
pub struct SuperResolver<B: Backend> {
    config: TfilmConfig,
    model: TfilmNet<B>,
    device: B::Device,
}

impl<B: Backend> SuperResolver<B> {
    /// Build a freshly initialized network for `config`.
    pub fn new(config: TfilmConfig, device: B::Device) -> Result<Self> {
        let model = config.init(&device)?;
        info!(
            input_len = config.input_len,
            num_levels = config.num_levels,
            upscale_ratio = config.upscale_ratio,
            params = model.num_params(),
            "created super-resolution model"
        );

        Ok(Self {
            config,
            model,
            device,
        })
    }

    /// Restore a network saved with [save](Self::save).
    pub fn load(config: TfilmConfig, path: impl AsRef<Path>, device: B::Device) -> Result<Self> {
        let path = path.as_ref();
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = config
            .init::<B>(&device)?
            .load_file(path.to_path_buf(), &recorder, &device)?;
        info!(path = %path.display(), "loaded super-resolution model");

        Ok(Self {
            config,
            model,
            device,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(path.as_ref().to_path_buf(), &recorder)?;

        Ok(())
    }

    /// Super-resolve a mono clip.
    ///
    /// The clip is upsampled by the configured ratio, then truncated to the largest length
    /// the depth schedule supports. The returned signal has that truncated length.
    #[tracing::instrument(skip_all, fields(samples = low_res.len()))]
    pub fn predict(&self, low_res: &[f32]) -> Result<Vec<f32>> {
        let mut upsampled = spline_upsample(low_res, self.config.upscale_ratio)?;

        let schedule = self.model.schedule();
        let length = schedule.truncated_len(upsampled.len());
        if length == 0 {
            return Err(TfilmError::InvalidInputLength(format!(
                "{} upsampled samples are shorter than one pooling window of {}",
                upsampled.len(),
                schedule.pooling_multiple()
            )));
        }
        if length < upsampled.len() {
            debug!(dropped = upsampled.len() - length, "truncated upsampled input");
            upsampled.truncate(length);
        }
        schedule.check_length(length)?;

        let data = TensorData::new(upsampled, [1, length, 1]).convert::<B::FloatElem>();
        let input = Tensor::<B, 3>::from_data(data, &self.device);

        let output = self.model.forward(input);

        Ok(output.into_data().iter::<f32>().collect())
    }

    pub fn model(&self) -> &TfilmNet<B> {
        &self.model
    }

    pub fn config(&self) -> &TfilmConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    fn config() -> TfilmConfig {
        TfilmConfig::new(1024, vec![8, 16, 16, 16], vec![9, 9, 5, 5])
    }

    fn tone(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.05).sin() * 0.5).collect()
    }

    #[test]
    fn predict_upsamples_by_the_configured_ratio() {
        let resolver = SuperResolver::<TestBackend>::new(config(), Default::default()).unwrap();

        let output = resolver.predict(&tone(512)).unwrap();
        assert_eq!(output.len(), 1024);
        assert!(output.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn predict_truncates_to_the_pooling_multiple() {
        let resolver = SuperResolver::<TestBackend>::new(config(), Default::default()).unwrap();

        // 515 * 2 = 1030 samples, 6 of which do not fit
        let output = resolver.predict(&tone(515)).unwrap();
        assert_eq!(output.len(), 1024);
    }

    #[test]
    fn predict_rejects_short_clips() {
        let resolver = SuperResolver::<TestBackend>::new(config(), Default::default()).unwrap();

        assert!(matches!(
            resolver.predict(&tone(3)),
            Err(TfilmError::InvalidInputLength(_))
        ));
        assert!(matches!(
            resolver.predict(&tone(10)),
            Err(TfilmError::InvalidInputLength(_))
        ));
    }

    #[test]
    fn predict_rejects_lengths_the_blocks_do_not_fit() {
        let resolver = SuperResolver::<TestBackend>::new(config(), Default::default()).unwrap();

        // 1056 is a multiple of 32 but not of the level 0 block span
        assert!(matches!(
            resolver.predict(&tone(528)),
            Err(TfilmError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn save_then_load_gives_identical_predictions() {
        let path = std::env::temp_dir().join(format!("tfilm-burn-{}", std::process::id()));
        let device = Default::default();
        let resolver = SuperResolver::<TestBackend>::new(config(), device).unwrap();
        resolver.save(&path).unwrap();

        let restored = SuperResolver::<TestBackend>::load(config(), &path, device).unwrap();
        let _ = std::fs::remove_file(path.with_extension("mpk"));

        let clip = tone(512);
        assert_eq!(
            resolver.predict(&clip).unwrap(),
            restored.predict(&clip).unwrap()
        );
    }
}
