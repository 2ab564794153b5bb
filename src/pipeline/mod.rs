pub mod control;
pub mod encode;

pub use control::{GstEncoderControl, ProbeFrame};
pub use encode::{EncodePipeline, InterruptHandle};
