use itertools::izip;

use crate::{
    error::{Result, TfilmError},
    model::TfilmConfig,
};

/// Shape of one encoder, bottleneck or decoder level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelSpec {
    pub level: usize,
    /// Channels entering the level's convolution.
    pub in_channels: usize,
    /// Channels produced by the convolution.
    pub conv_channels: usize,
    /// Channels leaving the level (after pooling or sub-pixel reshuffle).
    pub channels: usize,
    pub kernel_size: usize,
    pub block_size: usize,
    /// Sequence length leaving the level for the declared input length.
    pub length: usize,
}

/// Per-level shapes of the encoder/decoder stack, computed once from a [TfilmConfig].
///
/// `decoder[l]` mirrors `encoder[l]`; the decoder runs from level `L - 1` down to `0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepthSchedule {
    pub encoder: Vec<LevelSpec>,
    pub bottleneck: LevelSpec,
    pub decoder: Vec<LevelSpec>,
    /// Pooling factor of each encoder level, equal to the decoder's sub-pixel ratio.
    pub ratio: usize,
    pub dilation: usize,
    pub input_len: usize,
}

impl DepthSchedule {
    /// Build and validate the schedule for `config`, including its declared input length.
    pub fn new(config: &TfilmConfig) -> Result<Self> {
        check_config(config)?;

        let num_levels = config.num_levels;
        let ratio = config.subpixel_ratio;
        let channels = &config.channel_schedule;
        let kernels = &config.kernel_schedule;

        let block_size = |level: usize| -> Result<usize> {
            let divisor = checked_power(ratio, level)?;
            let size = config.base_block_size / divisor;
            if size == 0 || config.base_block_size % divisor != 0 {
                return Err(TfilmError::ConfigurationError(format!(
                    "base block size {} cannot be divided by {ratio}^{level}",
                    config.base_block_size
                )));
            }
            Ok(size)
        };
        let length = |level: usize| -> Result<usize> {
            Ok(config.input_len / checked_power(ratio, level + 1)?)
        };

        let mut encoder = Vec::with_capacity(num_levels);
        for (level, &nc, &ks) in izip!(0..num_levels, channels, kernels) {
            encoder.push(LevelSpec {
                level,
                in_channels: if level == 0 { 1 } else { channels[level - 1] },
                conv_channels: nc,
                channels: nc,
                kernel_size: ks,
                block_size: block_size(level)?,
                length: length(level)?,
            });
        }

        // The bottleneck takes the deepest entries of both schedules.
        let (deepest_channels, deepest_kernel) = match (channels.last(), kernels.last()) {
            (Some(&nc), Some(&ks)) => (nc, ks),
            _ => {
                return Err(TfilmError::ConfigurationError(
                    "channel and kernel schedules must not be empty".into(),
                ))
            }
        };
        let bottleneck = LevelSpec {
            level: num_levels,
            in_channels: channels[num_levels - 1],
            conv_channels: deepest_channels,
            channels: deepest_channels,
            kernel_size: deepest_kernel,
            block_size: block_size(num_levels)?,
            length: length(num_levels)?,
        };

        let decoder = encoder
            .iter()
            .map(|enc| LevelSpec {
                level: enc.level,
                in_channels: if enc.level + 1 == num_levels {
                    bottleneck.channels
                } else {
                    // Previous decoder output concatenated with its skip connection
                    2 * channels[enc.level + 1]
                },
                conv_channels: ratio * enc.channels,
                channels: enc.channels,
                kernel_size: enc.kernel_size,
                block_size: enc.block_size,
                length: enc.length,
            })
            .collect();

        let schedule = Self {
            encoder,
            bottleneck,
            decoder,
            ratio,
            dilation: config.dilation,
            input_len: config.input_len,
        };
        schedule.validate()?;
        schedule.check_length(config.input_len)?;

        Ok(schedule)
    }

    /// Check the structural symmetry between encoder and decoder levels.
    pub fn validate(&self) -> Result<()> {
        if self.encoder.is_empty() || self.encoder.len() != self.decoder.len() {
            return Err(TfilmError::ConfigurationError(format!(
                "{} encoder levels cannot be mirrored by {} decoder levels",
                self.encoder.len(),
                self.decoder.len()
            )));
        }

        for (enc, dec) in self.encoder.iter().zip(&self.decoder) {
            if enc.block_size == 0 || enc.block_size != dec.block_size {
                return Err(TfilmError::ConfigurationError(format!(
                    "level {}: decoder block size {} does not match encoder block size {}",
                    enc.level, dec.block_size, enc.block_size
                )));
            }
            if enc.length != dec.length || enc.channels != dec.channels {
                return Err(TfilmError::ConfigurationError(format!(
                    "level {}: decoder output [{}, {}] does not match skip connection [{}, {}]",
                    enc.level, dec.length, dec.channels, enc.length, enc.channels
                )));
            }
            if dec.conv_channels != self.ratio * dec.channels {
                return Err(TfilmError::ConfigurationError(format!(
                    "level {}: {} convolution channels cannot be reshuffled into {} channels",
                    dec.level, dec.conv_channels, dec.channels
                )));
            }
        }

        if self.bottleneck.block_size == 0 {
            return Err(TfilmError::ConfigurationError(
                "bottleneck block size must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Every input length must be a multiple of this value.
    pub fn pooling_multiple(&self) -> usize {
        // Bounded by `checked_power` at construction.
        self.ratio.pow(self.encoder.len() as u32 + 1)
    }

    /// Largest supported length not exceeding `length`, before block checks.
    pub fn truncated_len(&self, length: usize) -> usize {
        length - length % self.pooling_multiple()
    }

    /// Check that a high-resolution input of `length` samples fits the schedule.
    pub fn check_length(&self, length: usize) -> Result<()> {
        let multiple = self.pooling_multiple();
        if length == 0 || length % multiple != 0 {
            return Err(TfilmError::InvalidInputLength(format!(
                "input length {length} is not a positive multiple of {multiple}"
            )));
        }

        for spec in self.encoder.iter().chain(core::iter::once(&self.bottleneck)) {
            let level_len = length / self.ratio.pow(spec.level as u32 + 1);
            if level_len % spec.block_size != 0 {
                return Err(TfilmError::ShapeMismatch(format!(
                    "level {}: block size {} does not evenly divide sequence length {level_len}",
                    spec.level, spec.block_size
                )));
            }
        }

        Ok(())
    }

    pub fn num_levels(&self) -> usize {
        self.encoder.len()
    }
}

fn check_config(config: &TfilmConfig) -> Result<()> {
    let fail = |msg: String| Err(TfilmError::ConfigurationError(msg));
    let num_levels = config.num_levels;

    if num_levels == 0 {
        return fail("at least one downsampling level is required".into());
    }
    if config.channel_schedule.len() < num_levels {
        return fail(format!(
            "channel schedule has {} entries, {num_levels} levels need at least {num_levels}",
            config.channel_schedule.len()
        ));
    }
    if config.kernel_schedule.len() < num_levels {
        return fail(format!(
            "kernel schedule has {} entries, {num_levels} levels need at least {num_levels}",
            config.kernel_schedule.len()
        ));
    }
    if config.channel_schedule.contains(&0) {
        return fail("channel counts must be positive".into());
    }
    if let Some(ks) = config
        .kernel_schedule
        .iter()
        .chain(core::iter::once(&config.head_kernel_size))
        .find(|&&ks| ks % 2 == 0)
    {
        return fail(format!(
            "kernel width {ks} must be odd for same-length padding"
        ));
    }
    if config.subpixel_ratio < 2 {
        return fail(format!(
            "sub-pixel ratio must be at least 2, got {}",
            config.subpixel_ratio
        ));
    }
    if config.upscale_ratio == 0 {
        return fail("upscale ratio must be at least 1".into());
    }
    if config.dilation == 0 {
        return fail("dilation rate must be at least 1".into());
    }
    if !(0.0..1.0).contains(&config.dropout) {
        return fail(format!("dropout {} must be in [0, 1)", config.dropout));
    }

    checked_power(config.subpixel_ratio, num_levels + 1).map(|_| ())
}

fn checked_power(base: usize, exp: usize) -> Result<usize> {
    u32::try_from(exp)
        .ok()
        .and_then(|exp| base.checked_pow(exp))
        .ok_or_else(|| {
            TfilmError::ConfigurationError(format!("{base}^{exp} overflows the length range"))
        })
}
