//! Temporal feature-wise linear modulation (TFiLM) audio super-resolution for Burn.
//!
//! A low-resolution waveform is spline-upsampled to the target rate, then refined by a
//! U-Net whose levels are normalized by a recurrent network over fixed-size blocks.
//!
//! # Example
//!
//! ```ignore
//! use burn::backend::NdArray;
//! use tfilm_burn::{SuperResolver, TfilmConfig};
//!
//! type B = NdArray<f32>;
//!
//! let device = Default::default();
//! let resolver = SuperResolver::<B>::new(TfilmConfig::audio_tfilm(8192), device)?;
//! let high_res = resolver.predict(&low_res)?;
//! ```

pub mod error;
mod inference;
pub mod model;
pub mod normalizer;
pub mod recurrent;
pub mod schedule;
pub mod spline;
pub mod subpixel;
mod training;

pub use error::{Result, TfilmError};
pub use inference::*;
pub use model::{SkipCache, TfilmConfig, TfilmNet, TfilmOutput};
pub use schedule::{DepthSchedule, LevelSpec};
pub use spline::spline_upsample;
pub use subpixel::{subpixel_shuffle, subpixel_unshuffle, SubPixelLayout};
pub use training::*;
