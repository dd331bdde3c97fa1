use burn::{
    module::{Ignored, Module},
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TfilmError};

/// Channel ordering of the `ratio` interleaved channel groups.
///
/// For an input `[B, L, ratio * C]`, output position `i * ratio + g` takes channel group `g`
/// of input position `i`. The layouts differ in which input channels form group `g`:
///
/// * `GroupMajor`: channels `g * C .. (g + 1) * C` (contiguous groups).
/// * `ChannelMajor`: channels `c * ratio + g` for `c` in `0..C` (strided groups).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubPixelLayout {
    #[default]
    GroupMajor,
    ChannelMajor,
}

/// Sub-pixel reshuffle: trade channel depth for sequence length.
///
/// `[B, L, ratio * C]` -> `[B, ratio * L, C]`. Fails with `ShapeMismatch` when the channel
/// count is not a multiple of `ratio`.
pub fn subpixel_shuffle<B: Backend>(
    x: Tensor<B, 3>,
    ratio: usize,
    layout: SubPixelLayout,
) -> Result<Tensor<B, 3>> {
    check_ratio(ratio)?;
    let [_, _, channels] = x.dims();
    if channels % ratio != 0 {
        return Err(TfilmError::ShapeMismatch(format!(
            "{channels} channels cannot be split into {ratio} groups"
        )));
    }

    Ok(shuffle(x, ratio, layout))
}

/// Inverse of [subpixel_shuffle]: `[B, ratio * L, C]` -> `[B, L, ratio * C]`.
pub fn subpixel_unshuffle<B: Backend>(
    x: Tensor<B, 3>,
    ratio: usize,
    layout: SubPixelLayout,
) -> Result<Tensor<B, 3>> {
    check_ratio(ratio)?;
    let [_, length, _] = x.dims();
    if length % ratio != 0 {
        return Err(TfilmError::ShapeMismatch(format!(
            "sequence length {length} is not a multiple of {ratio}"
        )));
    }

    Ok(unshuffle(x, ratio, layout))
}

fn check_ratio(ratio: usize) -> Result<()> {
    if ratio == 0 {
        return Err(TfilmError::ConfigurationError(
            "sub-pixel ratio must be at least 1".into(),
        ));
    }
    Ok(())
}

pub(crate) fn shuffle<B: Backend>(
    x: Tensor<B, 3>,
    ratio: usize,
    layout: SubPixelLayout,
) -> Tensor<B, 3> {
    let [batch, length, channels] = x.dims();
    let out_channels = channels / ratio;

    match layout {
        SubPixelLayout::GroupMajor => x.reshape([batch, length * ratio, out_channels]),
        SubPixelLayout::ChannelMajor => x
            .reshape([batch, length, out_channels, ratio])
            .swap_dims(2, 3)
            .reshape([batch, length * ratio, out_channels]),
    }
}

pub(crate) fn unshuffle<B: Backend>(
    x: Tensor<B, 3>,
    ratio: usize,
    layout: SubPixelLayout,
) -> Tensor<B, 3> {
    let [batch, length, channels] = x.dims();
    let out_length = length / ratio;

    match layout {
        SubPixelLayout::GroupMajor => x.reshape([batch, out_length, channels * ratio]),
        SubPixelLayout::ChannelMajor => x
            .reshape([batch, out_length, ratio, channels])
            .swap_dims(2, 3)
            .reshape([batch, out_length, channels * ratio]),
    }
}

/// Parameter-free sub-pixel upsampling layer.
///
/// Shapes are validated by the depth schedule when the owning model is built.
#[derive(Module, Clone, Debug)]
pub struct SubPixel1d {
    ratio: usize,
    layout: Ignored<SubPixelLayout>,
}

impl SubPixel1d {
    pub fn new(ratio: usize, layout: SubPixelLayout) -> Self {
        Self {
            ratio,
            layout: Ignored(layout),
        }
    }

    /// `[B, L, ratio * C]` -> `[B, ratio * L, C]`
    pub fn forward<B: Backend>(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        shuffle(x, self.ratio, *self.layout)
    }
}
