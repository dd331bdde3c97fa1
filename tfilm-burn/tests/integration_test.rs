//! End-to-end checks of the super-resolution pipeline on the CPU backend.
//!
//! Run with: `cargo test`

use burn::backend::ndarray::NdArray;
use burn::tensor::{Tensor, TensorData};
use tfilm_burn::{
    signal_to_noise_ratio, spline_upsample, SuperResolver, TfilmConfig, TfilmError,
};

type B = NdArray<f32>;

const LOW_RES_LEN: usize = 512;

fn small_config(input_len: usize) -> TfilmConfig {
    TfilmConfig::new(input_len, vec![8, 16, 16, 16], vec![9, 9, 5, 5])
}

fn chirp(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / len as f32;
            (t * (20.0 + 40.0 * t)).sin() * 0.8
        })
        .collect()
}

fn to_tensor(samples: Vec<f32>) -> Tensor<B, 3> {
    let len = samples.len();
    Tensor::from_data(TensorData::new(samples, [1, len, 1]), &Default::default())
}

#[test]
fn low_res_clip_is_restored_to_full_length() {
    let clip = chirp(LOW_RES_LEN);
    let upsampled = spline_upsample(&clip, 2).unwrap();
    assert_eq!(upsampled.len(), 1024);

    let device = Default::default();
    let resolver = SuperResolver::<B>::new(small_config(1024), device).unwrap();

    let traced = resolver.model().forward_traced(to_tensor(upsampled));
    assert_eq!(traced.prediction.dims(), [1, 1024, 1]);
    assert_eq!(traced.skip_levels, [3, 2, 1, 0]);

    let output = resolver.predict(&clip).unwrap();
    assert_eq!(output.len(), 1024);
}

#[test]
fn prediction_stays_close_to_the_spline_estimate() {
    // The output head starts near zero, so an untrained model barely moves the input
    let clip = chirp(LOW_RES_LEN);
    let upsampled = spline_upsample(&clip, 2).unwrap();

    let resolver = SuperResolver::<B>::new(small_config(1024), Default::default()).unwrap();
    let output = resolver.predict(&clip).unwrap();

    let snr = signal_to_noise_ratio(to_tensor(output), to_tensor(upsampled)).into_scalar();
    assert!(snr > 10.0, "snr = {snr}");
}

#[test]
fn too_deep_for_the_channel_schedule() {
    let config = TfilmConfig::new(1 << 16, vec![8; 5], vec![9; 9]).with_num_levels(8);

    assert!(matches!(
        SuperResolver::<B>::new(config, Default::default()),
        Err(TfilmError::ConfigurationError(_))
    ));
}

#[test]
fn reference_preset_builds() {
    let config = TfilmConfig::audio_tfilm(8192);
    let schedule = tfilm_burn::DepthSchedule::new(&config).unwrap();

    assert_eq!(schedule.num_levels(), 4);
    assert_eq!(schedule.bottleneck.channels, 512);
}
