use burn::{
    backend::NdArray,
    tensor::{backend::Backend, Device, Tensor, TensorData},
};
use tfilm_burn::{signal_to_noise_ratio, spline_upsample, SuperResolver, TfilmConfig};
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: f32 = 16_000.0;
const HIGH_RES_LEN: usize = 8192;
const RATIO: usize = 2;

fn to_tensor<B: Backend>(samples: Vec<f32>, device: &Device<B>) -> Tensor<B, 3> {
    let len = samples.len();
    Tensor::from_data(
        TensorData::new(samples, [1, len, 1]).convert::<B::FloatElem>(),
        device,
    )
}

/// Two partials with a slow tremolo.
fn synth_clip(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            let tremolo = 0.75 + 0.25 * (2.0 * std::f32::consts::PI * 3.0 * t).sin();
            let tone = (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                + 0.3 * (2.0 * std::f32::consts::PI * 2_637.0 * t).sin();
            0.5 * tremolo * tone
        })
        .collect()
}

fn main() -> tfilm_burn::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tfilm_burn=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    type B = NdArray<f32>;
    let device = Default::default();

    let config = TfilmConfig::audio_tfilm(HIGH_RES_LEN).with_upscale_ratio(RATIO);
    let resolver = SuperResolver::<B>::new(config, device)?;

    let high_res = synth_clip(HIGH_RES_LEN);
    let low_res: Vec<f32> = high_res.iter().step_by(RATIO).copied().collect();

    let prediction = resolver.predict(&low_res)?;
    let length = prediction.len();
    let reference = to_tensor::<B>(high_res[..length].to_vec(), &device);

    let mut baseline = spline_upsample(&low_res, RATIO)?;
    baseline.truncate(length);

    let snr = |samples: Vec<f32>| -> f32 {
        signal_to_noise_ratio(to_tensor::<B>(samples, &device), reference.clone()).into_scalar()
    };

    println!("Low resolution: {} samples", low_res.len());
    println!("High resolution: {length} samples");
    println!("Spline baseline SNR: {:.2} dB", snr(baseline));
    println!("Untrained model SNR: {:.2} dB", snr(prediction));

    Ok(())
}
