//! File-to-file OMX encode pipeline with a frame-synchronized dynamic feature

use std::path::Path;
use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{info, warn};

use crate::dynamic::{dispatcher, DispatchStatus, Directive, Dispatcher};
use crate::pipeline::control::{GstEncoderControl, ProbeFrame};
use crate::{Config, ControlRate};

type SharedDispatcher = Arc<Mutex<Dispatcher<GstEncoderControl>>>;

/// `filesrc ! rawvideoparse ! omxh26Xenc ! capsfilter ! queue ! filesink`
pub struct EncodePipeline {
    pipeline: gst::Pipeline,
    parser: gst::Element,
    encoder: gst::Element,
    dispatcher: Option<SharedDispatcher>,
    outcome: Option<DispatchStatus>,
}

impl EncodePipeline {
    /// Create the encode pipeline for a validated configuration
    pub fn new(config: &Config) -> Result<Self> {
        // Initialize GStreamer
        gst::init().map_err(|e| eyre!("Failed to initialize GStreamer: {}", e))?;

        let element = config.encoder.codec.element();
        if gst::ElementFactory::find(element).is_none() {
            return Err(eyre!("Encoder element '{}' is not available", element));
        }

        let pipeline_str = Self::build_pipeline_string(config)?;
        info!("Pipeline: {}", pipeline_str);

        let pipeline = gst::parse::launch(&pipeline_str)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| eyre!("Failed to create pipeline"))?;

        let parser = pipeline
            .by_name("parser")
            .ok_or_else(|| eyre!("Failed to find parser element"))?;
        let encoder = pipeline
            .by_name("encoder")
            .ok_or_else(|| eyre!("Failed to find encoder element"))?;

        Ok(Self {
            pipeline,
            parser,
            encoder,
            dispatcher: None,
            outcome: None,
        })
    }

    /// Build the launch string, encoder settings included
    fn build_pipeline_string(config: &Config) -> Result<String> {
        let stream = &config.stream;
        let enc = &config.encoder;

        let input = stream
            .input
            .as_deref()
            .ok_or_else(|| eyre!("No input file configured"))?;
        let output = stream
            .output
            .as_deref()
            .ok_or_else(|| eyre!("No output file configured"))?;

        let mut encoder = format!(
            "{} name=encoder target-bitrate={} b-frames={} control-rate={} \
             gop-length={} long-term-ref={} long-term-freq={}",
            enc.codec.element(),
            enc.target_bitrate,
            enc.b_frames,
            enc.control_rate.nick(),
            enc.gop_length,
            enc.long_term_ref,
            enc.long_term_freq
        );
        if enc.control_rate == ControlRate::Vbr {
            encoder.push_str(&format!(" max-bitrate={}", enc.max_bitrate));
        }

        Ok(format!(
            "filesrc location={} ! \
             rawvideoparse name=parser width={} height={} format={} framerate={}/1 ! \
             {} ! \
             {} ! \
             queue ! \
             filesink location={}",
            quote(input),
            stream.width,
            stream.height,
            stream.format.nick(),
            stream.framerate,
            encoder,
            enc.codec.caps(),
            quote(output)
        ))
    }

    /// Watch the parser's output and fire `directive` on its trigger frame
    pub fn install_directive(&mut self, directive: Directive) -> Result<()> {
        if self.dispatcher.is_some() {
            return Err(eyre!("A dynamic feature is already installed"));
        }

        let pad = self
            .parser
            .static_pad("src")
            .ok_or_else(|| eyre!("Parser has no src pad"))?;

        info!("Installing dynamic feature {}", directive);
        let control = GstEncoderControl::new(self.encoder.clone());
        let dispatcher = Arc::new(Mutex::new(Dispatcher::new(directive, control)));

        let frame_dispatcher = Arc::clone(&dispatcher);
        pad.add_probe(gst::PadProbeType::BUFFER, move |pad, info| {
            if let Some(gst::PadProbeData::Buffer(ref mut buffer)) = info.data {
                let mut frame = ProbeFrame {
                    pad,
                    buffer: buffer.make_mut(),
                };
                // Buffers arrive serially on the streaming thread
                if let Ok(mut dispatcher) = frame_dispatcher.lock() {
                    dispatcher.on_frame(&mut frame);
                }
            }
            gst::PadProbeReturn::Ok
        })
        .ok_or_else(|| eyre!("Failed to add buffer probe"))?;

        self.dispatcher = Some(dispatcher);
        Ok(())
    }

    /// How the installed dynamic feature ended, once `run` has returned
    pub fn outcome(&self) -> Option<DispatchStatus> {
        self.outcome
    }

    /// Handle that can end the stream from another task
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            pipeline: self.pipeline.clone(),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        info!("Starting encode pipeline");

        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| eyre!("Failed to start pipeline: {:?}", e))?;

        Ok(())
    }

    /// Run until end of stream or error (blocking)
    pub fn run(&mut self) -> Result<()> {
        self.start()?;

        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| eyre!("Pipeline has no bus"))?;

        for msg in bus.iter_timed(gst::ClockTime::NONE) {
            use gst::MessageView;

            match msg.view() {
                MessageView::Eos(..) => {
                    info!("End of stream");
                    break;
                }
                MessageView::Error(err) => {
                    self.stop()?;
                    self.report_outcome();
                    return Err(eyre!(
                        "Error from {:?}: {} ({:?})",
                        err.src().map(|s| s.path_string()),
                        err.error(),
                        err.debug()
                    ));
                }
                MessageView::Warning(warning) => {
                    warn!(
                        "Warning from {:?}: {} ({:?})",
                        warning.src().map(|s| s.path_string()),
                        warning.error(),
                        warning.debug()
                    );
                }
                MessageView::Info(info) => {
                    info!(
                        "Info from {:?}: {} ({:?})",
                        info.src().map(|s| s.path_string()),
                        info.error(),
                        info.debug()
                    );
                }
                _ => {}
            }
        }

        self.stop()?;
        self.report_outcome();

        Ok(())
    }

    fn report_outcome(&mut self) {
        let Some(shared) = &self.dispatcher else {
            return;
        };
        if let Ok(guard) = shared.lock() {
            let status = guard.status();
            dispatcher::log_outcome(guard.directive(), status);
            self.outcome = Some(status);
        }
    }

    pub fn stop(&mut self) -> Result<()> {
        info!("Stopping encode pipeline");

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| eyre!("Failed to stop pipeline: {:?}", e))?;

        Ok(())
    }
}

impl Drop for EncodePipeline {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Ends the stream from outside the bus loop
#[derive(Clone)]
pub struct InterruptHandle {
    pipeline: gst::Pipeline,
}

impl InterruptHandle {
    pub fn send_eos(&self) {
        if !self.pipeline.send_event(gst::event::Eos::new()) {
            warn!("Pipeline did not accept EOS");
        }
    }
}

/// Quote a path for a launch string
fn quote(path: &Path) -> String {
    format!("\"{}\"", path.display().to_string().replace('"', "\\\""))
}
