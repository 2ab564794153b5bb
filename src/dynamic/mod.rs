//! Dynamic encoder features: descriptor language and frame-synchronized dispatch

pub mod directive;
pub mod dispatcher;
pub mod executor;
pub mod parser;

pub use directive::{Action, Directive, DirectiveKind, RegionOfInterest};
pub use dispatcher::{DispatchStatus, Dispatcher};
pub use executor::{execute, ControlMessage, ControlSurface, EmitError, EncoderProperty};
pub use parser::{parse, FieldProblem, ParseError};
