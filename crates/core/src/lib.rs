pub mod biquad_filter;
pub mod capture;
pub mod constants;
pub mod effect_chain;
pub mod filter_design;
pub mod frame;
pub mod params;
pub mod pipeline;
pub mod pitch;

pub use capture::{CaptureBackend, CaptureSource, DeviceSelector, InputDevice, NullSource, ReadStatus};
pub use effect_chain::EffectChain;
pub use params::{ParameterSnapshot, PipelineParameters};
pub use pipeline::AudioPipeline;
