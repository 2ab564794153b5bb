//! GStreamer implementation of the encoder control surface

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_video as gst_video;
use tracing::{debug, warn};

use crate::dynamic::{ControlMessage, ControlSurface, EmitError, EncoderProperty, RegionOfInterest};

/// ROI meta type understood by the OMX encoders
const ROI_TYPE: &str = "face";
const ROI_PARAM_STRUCTURE: &str = "roi/omx-alg";

/// A buffer passing the parser's src pad, with the pad it travels through
pub struct ProbeFrame<'a> {
    pub pad: &'a gst::Pad,
    pub buffer: &'a mut gst::BufferRef,
}

/// Encoder element plus the pad-level primitives directives need
pub struct GstEncoderControl {
    encoder: gst::Element,
}

impl GstEncoderControl {
    pub fn new(encoder: gst::Element) -> Self {
        Self { encoder }
    }
}

/// Custom event payload for a control message
pub fn message_structure(message: ControlMessage) -> gst::Structure {
    let builder = gst::Structure::builder(message.structure_name());
    match message {
        ControlMessage::SceneChange { look_ahead } => builder.field("look-ahead", look_ahead).build(),
        ControlMessage::InsertLongTerm | ControlMessage::UseLongTerm => builder.build(),
    }
}

impl<'a> ControlSurface<ProbeFrame<'a>> for GstEncoderControl {
    fn set_property(&mut self, property: EncoderProperty, value: u32) {
        if self.encoder.find_property(property.name()).is_none() {
            warn!("Encoder has no '{}' property", property.name());
            return;
        }
        self.encoder.set_property(property.name(), value);
    }

    fn enable_region_qp_mode(&mut self) {
        if self.encoder.find_property("qp-mode").is_none() {
            warn!("Encoder has no 'qp-mode' property, ROI may be ignored");
            return;
        }
        self.encoder.set_property_from_str("qp-mode", "roi");
    }

    fn force_key_frame(&mut self, frame: &mut ProbeFrame<'a>) {
        let event = gst_video::DownstreamForceKeyUnitEvent::builder()
            .timestamp(frame.buffer.pts())
            .all_headers(false)
            .count(1)
            .build();

        if !frame.pad.push_event(event) {
            warn!("Force key unit event was not handled downstream");
        }
    }

    fn annotate_region(&mut self, frame: &mut ProbeFrame<'a>, region: &RegionOfInterest) {
        let mut meta = gst_video::VideoRegionOfInterestMeta::add(
            &mut *frame.buffer,
            ROI_TYPE,
            (region.x, region.y, region.width, region.height),
        );
        meta.add_param(
            gst::Structure::builder(ROI_PARAM_STRUCTURE)
                .field("quality", region.quality.as_str())
                .build(),
        );
        debug!("Attached ROI meta to buffer {:?}", frame.buffer.pts());
    }

    fn send_downstream(
        &mut self,
        frame: &mut ProbeFrame<'a>,
        message: ControlMessage,
    ) -> Result<(), EmitError> {
        let peer = frame.pad.peer().ok_or(EmitError::NoPeer)?;
        let event = gst::event::CustomDownstream::new(message_structure(message));

        if peer.send_event(event) {
            Ok(())
        } else {
            Err(EmitError::Rejected {
                structure: message.structure_name(),
            })
        }
    }
}
