//! Audio loading and signal analysis.

pub mod energy;
pub mod wav;

pub use energy::{EnergyEnvelope, calculate_rms};
pub use wav::{Waveform, validate_audio_path};
