//! Applies a fired directive against the encoder's control surface

use tracing::{error, info};

use super::directive::{Action, Directive, RegionOfInterest};

/// Integer-valued encoder properties a directive may change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderProperty {
    TargetBitrate,
    GopLength,
    BFrames,
}

impl EncoderProperty {
    /// Element property name
    pub fn name(self) -> &'static str {
        match self {
            EncoderProperty::TargetBitrate => "target-bitrate",
            EncoderProperty::GopLength => "gop-length",
            EncoderProperty::BFrames => "b-frames",
        }
    }
}

/// Out-of-band message sent downstream to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    SceneChange { look_ahead: u32 },
    InsertLongTerm,
    UseLongTerm,
}

impl ControlMessage {
    /// Name of the structure carried by the custom event
    pub fn structure_name(&self) -> &'static str {
        match self {
            ControlMessage::SceneChange { .. } => "omx-alg/scene-change",
            ControlMessage::InsertLongTerm => "omx-alg/insert-longterm",
            ControlMessage::UseLongTerm => "omx-alg/use-longterm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    #[error("pad has no peer to receive the event")]
    NoPeer,

    #[error("peer rejected '{structure}' event")]
    Rejected { structure: &'static str },
}

/// Control surface exposed by the encoder collaborator.
///
/// `F` is the frame buffer type delivered through the observation hook.
/// Calls arrive on the streaming thread, in stream order.
pub trait ControlSurface<F> {
    fn set_property(&mut self, property: EncoderProperty, value: u32);

    /// Switch the encoder's QP mode so that region annotations are honored
    fn enable_region_qp_mode(&mut self);

    /// Request a key frame at the frame's timestamp
    fn force_key_frame(&mut self, frame: &mut F);

    fn annotate_region(&mut self, frame: &mut F, region: &RegionOfInterest);

    fn send_downstream(&mut self, frame: &mut F, message: ControlMessage) -> Result<(), EmitError>;
}

/// Apply `directive` to `surface` for the frame that triggered it
pub fn execute<F, S>(directive: &Directive, surface: &mut S, frame: &mut F)
where
    S: ControlSurface<F> + ?Sized,
{
    let at = directive.trigger_frame();

    match directive.action() {
        Action::SetBitrate { kbps } => {
            info!("Changing target bitrate to {} kbps at frame {}", kbps, at);
            surface.set_property(EncoderProperty::TargetBitrate, *kbps);
        }
        Action::SetGopLength { length } => {
            info!("Changing GOP length to {} at frame {}", length, at);
            surface.set_property(EncoderProperty::GopLength, *length);
        }
        Action::SetBFrameCount { count } => {
            info!("Changing B-frame count to {} at frame {}", count, at);
            surface.set_property(EncoderProperty::BFrames, *count);
        }
        Action::InsertKeyFrame => {
            info!("Inserting key frame at frame {}", at);
            surface.force_key_frame(frame);
        }
        Action::AddRegionOfInterest(region) => {
            info!(
                "Adding ROI at {}x{}, size {}x{}, quality {} at frame {}",
                region.x, region.y, region.width, region.height, region.quality, at
            );
            surface.enable_region_qp_mode();
            surface.annotate_region(frame, region);
        }
        Action::SceneChangeHint { look_ahead } => {
            info!("Scene change at frame {} in {} frames", at, look_ahead);
            emit(surface, frame, ControlMessage::SceneChange { look_ahead: *look_ahead });
        }
        Action::MarkLongTermReference => {
            info!("Marking long-term reference picture at frame {}", at);
            emit(surface, frame, ControlMessage::InsertLongTerm);
        }
        Action::UseLongTermReference => {
            info!("Using long-term reference picture at frame {}", at);
            emit(surface, frame, ControlMessage::UseLongTerm);
        }
    }
}

fn emit<F, S>(surface: &mut S, frame: &mut F, message: ControlMessage)
where
    S: ControlSurface<F> + ?Sized,
{
    // Delivery failures leave the stream running
    if let Err(e) = surface.send_downstream(frame, message) {
        error!("Failed to send {} event: {}", message.structure_name(), e);
    }
}
