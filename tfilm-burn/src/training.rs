use core::f64::consts::LN_10;

use burn::{
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::{RegressionOutput, TrainOutput, TrainStep, ValidStep},
};

use crate::model::TfilmNet;

/// A batch of aligned waveforms `[batch, length, 1]`.
#[derive(Clone, Debug)]
pub struct AudioBatch<B: Backend> {
    /// Low-resolution audio already brought to the target length (spline-upsampled).
    pub low_res: Tensor<B, 3>,
    /// Ground-truth high-resolution audio.
    pub high_res: Tensor<B, 3>,
}

/// Square root of the per-example mean squared error, averaged over the batch.
pub fn sqrt_l2_loss<B: Backend>(prediction: Tensor<B, 3>, target: Tensor<B, 3>) -> Tensor<B, 1> {
    let squared: Tensor<B, 2> = (prediction - target).powf_scalar(2.0).flatten(1, 2);

    squared.mean_dim(1).add_scalar(1e-6).sqrt().mean()
}

/// Signal-to-noise ratio of `prediction` against `target` in decibels, averaged over the batch.
pub fn signal_to_noise_ratio<B: Backend>(
    prediction: Tensor<B, 3>,
    target: Tensor<B, 3>,
) -> Tensor<B, 1> {
    let noise: Tensor<B, 2> = (prediction - target.clone()).powf_scalar(2.0).flatten(1, 2);
    let signal: Tensor<B, 2> = target.powf_scalar(2.0).flatten(1, 2);

    let ratio = signal.sum_dim(1) / noise.sum_dim(1).add_scalar(1e-8);
    ratio.log().div_scalar(LN_10).mul_scalar(10.0).mean()
}

impl<B: Backend> TfilmNet<B> {
    pub fn forward_regression(
        &self,
        low_res: Tensor<B, 3>,
        high_res: Tensor<B, 3>,
    ) -> RegressionOutput<B> {
        let prediction = self.forward(low_res);
        let loss = sqrt_l2_loss(prediction.clone(), high_res.clone());

        RegressionOutput::new(loss, prediction.flatten(1, 2), high_res.flatten(1, 2))
    }
}

impl<B: AutodiffBackend> TrainStep<AudioBatch<B>, RegressionOutput<B>> for TfilmNet<B> {
    fn step(&self, batch: AudioBatch<B>) -> TrainOutput<RegressionOutput<B>> {
        let item = self.forward_regression(batch.low_res, batch.high_res);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<AudioBatch<B>, RegressionOutput<B>> for TfilmNet<B> {
    fn step(&self, batch: AudioBatch<B>) -> RegressionOutput<B> {
        self.forward_regression(batch.low_res, batch.high_res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::TfilmConfig,
        tests::{TestAutodiffBackend, TestBackend},
    };
    use burn::tensor::Distribution;

    fn scalar(x: Tensor<TestBackend, 1>) -> f32 {
        x.into_scalar()
    }

    #[test]
    fn loss_of_a_perfect_prediction_is_the_epsilon_floor() {
        let device = Default::default();
        let target = Tensor::<TestBackend, 3>::random([2, 16, 1], Distribution::Default, &device);

        let loss = scalar(sqrt_l2_loss(target.clone(), target));
        assert!((loss - 1e-3).abs() < 1e-5);
    }

    #[test]
    fn loss_is_root_mean_square_error() {
        let device = Default::default();
        let prediction = Tensor::<TestBackend, 3>::zeros([1, 4, 1], &device);
        let target = Tensor::<TestBackend, 3>::from_floats([[[2.0], [2.0], [2.0], [2.0]]], &device);

        let loss = scalar(sqrt_l2_loss(prediction, target));
        assert!((loss - 2.0).abs() < 1e-4);
    }

    #[test]
    fn snr_of_ten_percent_error_is_twenty_decibels() {
        let device = Default::default();
        let target = Tensor::<TestBackend, 3>::ones([2, 32, 1], &device);
        let prediction = target.clone().mul_scalar(0.9);

        let snr = scalar(signal_to_noise_ratio(prediction, target));
        assert!((snr - 20.0).abs() < 1e-3, "snr = {snr}");
    }

    #[test]
    fn train_step_produces_gradients() {
        let device = Default::default();
        let model = TfilmConfig::new(512, vec![4, 8], vec![9, 5])
            .with_num_levels(2)
            .init::<TestAutodiffBackend>(&device)
            .unwrap();
        let batch = AudioBatch {
            low_res: Tensor::random([2, 512, 1], Distribution::Default, &device),
            high_res: Tensor::random([2, 512, 1], Distribution::Default, &device),
        };

        let output = TrainStep::step(&model, batch);

        assert!(!output.grads.is_empty());
        assert_eq!(output.item.output.dims(), [2, 512]);
        assert_eq!(output.item.targets.dims(), [2, 512]);
    }

    #[test]
    fn valid_step_reports_finite_loss() {
        let device = Default::default();
        let model = TfilmConfig::new(512, vec![4, 8], vec![9, 5])
            .with_num_levels(2)
            .init::<TestBackend>(&device)
            .unwrap();
        let batch = AudioBatch {
            low_res: Tensor::random([1, 512, 1], Distribution::Default, &device),
            high_res: Tensor::random([1, 512, 1], Distribution::Default, &device),
        };

        let output = ValidStep::step(&model, batch);
        assert!(scalar(output.loss).is_finite());
    }
}
