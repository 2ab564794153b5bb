//! Single-shot, frame-synchronized trigger for a directive

use metrics::counter;
use tracing::{debug, info, warn};

use super::directive::Directive;
use super::executor::{self, ControlSurface};

/// Where a dispatcher stands relative to its trigger frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Pending { frames_remaining: u64 },
    Fired { frame: u64 },
    /// Trigger frame passed without the directive firing
    Missed {
        trigger_frame: u64,
        frames_observed: u64,
    },
}

/// Owns one directive and fires it when the stream reaches its trigger frame.
///
/// Call [`Dispatcher::on_frame`] once per frame, in stream order. The counter
/// only moves forward and is compared for exact equality, so the directive
/// fires at most once per run.
pub struct Dispatcher<S> {
    directive: Directive,
    surface: S,
    counter: u64,
    first_frame: u64,
    fired: bool,
}

impl<S> Dispatcher<S> {
    /// Dispatcher observing the stream from its first frame
    pub fn new(directive: Directive, surface: S) -> Self {
        Self::attached_at(directive, surface, 0)
    }

    /// Dispatcher installed after `first_frame` frames have already passed.
    ///
    /// There is no retroactive firing: a directive whose trigger frame is
    /// below `first_frame` never fires.
    pub fn attached_at(directive: Directive, surface: S, first_frame: u64) -> Self {
        if directive.trigger_frame() < first_frame {
            warn!(
                "Dynamic feature {} attached at frame {}, after its trigger frame; it will not fire",
                directive, first_frame
            );
        }

        Self {
            directive,
            surface,
            counter: first_frame,
            first_frame,
            fired: false,
        }
    }

    /// Observe the next frame of the stream
    pub fn on_frame<F>(&mut self, frame: &mut F)
    where
        S: ControlSurface<F>,
    {
        self.fire_if_due(frame);
        self.counter += 1;
        counter!("dynamic_frames_observed_total").increment(1);
    }

    fn fire_if_due<F>(&mut self, frame: &mut F)
    where
        S: ControlSurface<F>,
    {
        if self.fired || self.counter != self.directive.trigger_frame() {
            return;
        }

        debug!("Frame {} reached, firing {}", self.counter, self.directive);
        executor::execute(&self.directive, &mut self.surface, frame);
        self.fired = true;
        counter!("dynamic_directive_fired_total", "kind" => self.directive.kind().token())
            .increment(1);
    }

    /// Index of the next frame to be observed
    pub fn frame_count(&self) -> u64 {
        self.counter
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn directive(&self) -> &Directive {
        &self.directive
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn status(&self) -> DispatchStatus {
        let trigger_frame = self.directive.trigger_frame();

        if self.fired {
            DispatchStatus::Fired {
                frame: trigger_frame,
            }
        } else if self.counter > trigger_frame {
            DispatchStatus::Missed {
                trigger_frame,
                frames_observed: self.counter - self.first_frame,
            }
        } else {
            DispatchStatus::Pending {
                frames_remaining: trigger_frame - self.counter,
            }
        }
    }

    /// Stop observing and report the final status.
    ///
    /// A directive that never fired is a normal outcome and is only logged.
    pub fn finish(self) -> DispatchStatus {
        let status = self.status();
        log_outcome(&self.directive, status);
        status
    }
}

/// Log the end-of-stream outcome of a directive
pub fn log_outcome(directive: &Directive, status: DispatchStatus) {
    match status {
        DispatchStatus::Fired { frame } => {
            debug!("Dynamic feature {} fired at frame {}", directive, frame);
        }
        DispatchStatus::Pending { frames_remaining } => {
            info!(
                "Stream ended {} frames before dynamic feature {} could fire",
                frames_remaining, directive
            );
        }
        DispatchStatus::Missed {
            trigger_frame,
            frames_observed,
        } => {
            info!(
                "Dynamic feature {} skipped: trigger frame {} passed before attach ({} frames observed)",
                directive, trigger_frame, frames_observed
            );
        }
    }
}
