use burn::{
    config::Config,
    module::{Ignored, Module},
    tensor::{backend::Backend, Device, Tensor},
};
use tracing::debug;

use super::{
    blocks::{DownBlock, DownBlockConfig, UpBlock, UpBlockConfig},
    head::{OutputHead, OutputHeadConfig},
};
use crate::{
    error::TfilmError,
    recurrent::RecurrenceKind,
    schedule::DepthSchedule,
    subpixel::SubPixelLayout,
};

/// Channel counts of the reference model, deepest last.
pub const CHANNEL_SCHEDULE: [usize; 8] = [128, 256, 512, 512, 512, 512, 512, 512];
/// Convolution kernel widths of the reference model, deepest last.
pub const KERNEL_SCHEDULE: [usize; 9] = [65, 33, 17, 9, 9, 9, 9, 9, 9];

/// Temporal feature-wise modulation network for audio super-resolution.
///
/// A U-Net over `[batch, length, 1]` waveforms: dilated convolution encoder levels with
/// recurrent block normalization, a bottleneck, sub-pixel decoder levels fed by skip
/// connections and a residual output head. The input is expected to already be at the
/// target resolution (for instance spline-upsampled); the network predicts a correction.
#[derive(Module, Debug)]
pub struct TfilmNet<B: Backend> {
    encoder: Vec<DownBlock<B>>,
    bottleneck: DownBlock<B>,
    /// Indexed by level, run from the deepest level up.
    decoder: Vec<UpBlock<B>>,
    head: OutputHead<B>,
    schedule: Ignored<DepthSchedule>,
}

/// Output of [TfilmNet::forward_traced].
#[derive(Debug, Clone)]
pub struct TfilmOutput<B: Backend> {
    /// Predicted waveform `[batch, length, 1]`.
    pub prediction: Tensor<B, 3>,
    /// Correction added to the input `[batch, length, 1]`.
    pub residual: Tensor<B, 3>,
    /// Encoder levels in the order their activations were consumed by the decoder.
    pub skip_levels: Vec<usize>,
}

impl<B: Backend> TfilmNet<B> {
    /// `[batch, length, 1]` -> `[batch, length, 1]`
    ///
    /// The length must satisfy [DepthSchedule::check_length]; see [try_forward](Self::try_forward).
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        self.forward_traced(input).prediction
    }

    /// Validate the input shape against the depth schedule, then run [forward](Self::forward).
    pub fn try_forward(&self, input: Tensor<B, 3>) -> crate::error::Result<Tensor<B, 3>> {
        let [_, length, channels] = input.dims();
        if channels != 1 {
            return Err(TfilmError::ShapeMismatch(format!(
                "expected a single-channel waveform, got {channels} channels"
            )));
        }
        self.schedule.check_length(length)?;

        Ok(self.forward(input))
    }

    /// Forward pass that also returns the residual and the skip consumption order.
    pub fn forward_traced(&self, input: Tensor<B, 3>) -> TfilmOutput<B> {
        let mut skips = SkipCache::with_capacity(self.encoder.len());

        let mut x = input.clone();
        for block in &self.encoder {
            x = block.forward(x);
            skips.push(x.clone());
        }

        let mut x = self.bottleneck.forward(x);

        let mut skip_levels = Vec::with_capacity(self.decoder.len());
        for block in self.decoder.iter().rev() {
            let Some((level, skip)) = skips.pop() else {
                break;
            };
            debug_assert_eq!(level, block.level());

            x = block.forward(x, skip);
            skip_levels.push(level);
        }

        let residual = self.head.forward(x);

        TfilmOutput {
            prediction: residual.clone() + input,
            residual,
            skip_levels,
        }
    }

    pub fn schedule(&self) -> &DepthSchedule {
        &self.schedule
    }
}

/// Encoder activations kept for the decoder, consumed last-in first-out.
#[derive(Debug)]
pub struct SkipCache<B: Backend> {
    entries: Vec<Tensor<B, 3>>,
}

impl<B: Backend> Default for SkipCache<B> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<B: Backend> SkipCache<B> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Store the activation of the next level and return that level.
    pub fn push(&mut self, activation: Tensor<B, 3>) -> usize {
        self.entries.push(activation);
        self.entries.len() - 1
    }

    /// Take the deepest remaining activation with its level.
    pub fn pop(&mut self) -> Option<(usize, Tensor<B, 3>)> {
        let activation = self.entries.pop()?;
        Some((self.entries.len(), activation))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// [TfilmNet] configuration.
#[derive(Config, Debug)]
pub struct TfilmConfig {
    /// Declared length of the (already upsampled) network input.
    pub input_len: usize,
    /// Channels per encoder level; the last entry sizes the bottleneck.
    pub channel_schedule: Vec<usize>,
    /// Kernel width per encoder level; the last entry sizes the bottleneck.
    pub kernel_schedule: Vec<usize>,
    #[config(default = "4")]
    pub num_levels: usize,
    #[config(default = "2")]
    pub dilation: usize,
    /// Pooling factor of the encoder and reshuffle ratio of the decoder.
    #[config(default = "2")]
    pub subpixel_ratio: usize,
    /// Spline upsampling ratio applied before inference.
    #[config(default = "2")]
    pub upscale_ratio: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
    #[config(default = "0.2")]
    pub leaky_slope: f64,
    /// Block size of level 0; divided by `subpixel_ratio` at every deeper level.
    #[config(default = "128")]
    pub base_block_size: usize,
    #[config(default = "9")]
    pub head_kernel_size: usize,
    #[config(default = "SubPixelLayout::GroupMajor")]
    pub subpixel_layout: SubPixelLayout,
    #[config(default = "RecurrenceKind::Forward")]
    pub recurrence: RecurrenceKind,
}

impl TfilmConfig {
    /// Reference schedule: four levels over [CHANNEL_SCHEDULE] and [KERNEL_SCHEDULE].
    pub fn audio_tfilm(input_len: usize) -> Self {
        Self::new(
            input_len,
            CHANNEL_SCHEDULE.to_vec(),
            KERNEL_SCHEDULE.to_vec(),
        )
    }

    /// Initialize a new [TfilmNet] module.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to create the module on.
    ///
    /// # Returns
    ///
    /// The network, or a configuration error when the schedule is inconsistent.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> crate::error::Result<TfilmNet<B>> {
        let schedule = DepthSchedule::new(self)?;
        let ratio = schedule.ratio;

        let encoder: Vec<DownBlock<B>> = schedule
            .encoder
            .iter()
            .map(|spec| {
                DownBlockConfig::new(
                    spec,
                    self.dilation,
                    ratio,
                    None,
                    self.leaky_slope,
                    self.recurrence,
                )
                .init(device)
            })
            .collect();

        let bottleneck = DownBlockConfig::new(
            &schedule.bottleneck,
            self.dilation,
            ratio,
            Some(self.dropout),
            self.leaky_slope,
            self.recurrence,
        )
        .init(device);

        let decoder: Vec<UpBlock<B>> = schedule
            .decoder
            .iter()
            .map(|spec| {
                UpBlockConfig::new(
                    spec,
                    self.dilation,
                    ratio,
                    self.dropout,
                    self.subpixel_layout,
                    self.recurrence,
                )
                .init(device)
            })
            .collect();

        // Decoder level 0 output concatenated with its skip connection
        let head_channels = 2 * schedule.decoder[0].channels;
        let head = OutputHeadConfig::new(
            head_channels,
            self.head_kernel_size,
            ratio,
            self.subpixel_layout,
        )
        .init(device);

        let model = TfilmNet {
            encoder,
            bottleneck,
            decoder,
            head,
            schedule: Ignored(schedule),
        };
        log_parameters(&model);

        Ok(model)
    }
}

fn log_parameters<B: Backend>(model: &TfilmNet<B>) {
    let schedule = model.schedule();

    for (spec, block) in schedule.encoder.iter().zip(&model.encoder) {
        debug!(
            level = spec.level,
            length = spec.length,
            channels = spec.channels,
            block_size = spec.block_size,
            normalizer_params = block.normalizer().num_params(),
            "encoder level"
        );
    }
    debug!(
        length = schedule.bottleneck.length,
        channels = schedule.bottleneck.channels,
        block_size = schedule.bottleneck.block_size,
        normalizer_params = model.bottleneck.normalizer().num_params(),
        "bottleneck"
    );
    for (spec, block) in schedule.decoder.iter().zip(&model.decoder).rev() {
        debug!(
            level = spec.level,
            channels = spec.channels,
            block_size = spec.block_size,
            normalizer_params = block.normalizer().num_params(),
            "decoder level"
        );
    }
    debug!(params = model.num_params(), "built TFiLM network");
}
