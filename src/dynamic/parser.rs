//! Descriptor tokenizer and per-kind field extraction
//!
//! A descriptor is `<kind>:<frame>[:<field>]*`. Region-of-interest position
//! and size are packed as `NxM` pairs. The `,` feature separator is reserved
//! for carrying several directives; only one is accepted per descriptor.

use std::fmt;
use std::str::{FromStr, Split};

use super::directive::{Action, Directive, DirectiveKind, RegionOfInterest};

const FEATURE_DELIMITER: char = ',';
const FIELD_DELIMITER: char = ':';
const PAIR_DELIMITER: char = 'x';

/// What is wrong with a single descriptor field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    Empty,
    NotAnInteger(String),
    NotAPair(String),
    Unexpected(String),
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Missing => f.write_str("field is missing"),
            FieldProblem::Empty => f.write_str("field is empty"),
            FieldProblem::NotAnInteger(token) => write!(f, "'{}' is not a base-10 integer", token),
            FieldProblem::NotAPair(token) => write!(f, "'{}' is not of the form NxM", token),
            FieldProblem::Unexpected(token) => write!(f, "unexpected extra field '{}'", token),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown dynamic feature '{0}'")]
    UnknownKind(String),

    #[error("malformed {field} in {kind} descriptor: {problem}")]
    MalformedField {
        kind: DirectiveKind,
        field: &'static str,
        problem: FieldProblem,
    },

    #[error("descriptor holds {count} features, only one dynamic feature is supported per run")]
    MultipleDirectives { count: usize },
}

/// Parse a dynamic-feature descriptor into a [`Directive`]
pub fn parse(descriptor: &str) -> Result<Directive, ParseError> {
    // Empty segments, e.g. from a trailing ',', carry no feature
    let mut features = descriptor
        .split(FEATURE_DELIMITER)
        .filter(|segment| !segment.is_empty());
    let count = features.clone().count();
    if count > 1 {
        return Err(ParseError::MultipleDirectives { count });
    }
    let feature = features.next().unwrap_or_default();

    let mut tokens = feature.split(FIELD_DELIMITER);
    let head = tokens.next().unwrap_or_default();
    let kind =
        DirectiveKind::from_token(head).ok_or_else(|| ParseError::UnknownKind(head.to_string()))?;

    let mut fields = Fields { kind, tokens };
    let trigger_frame = fields.integer::<u64>("frame")?;

    let action = match kind {
        DirectiveKind::SetBitrate => Action::SetBitrate {
            kbps: fields.integer("value")?,
        },
        DirectiveKind::SetGopLength => Action::SetGopLength {
            length: fields.integer("value")?,
        },
        DirectiveKind::SetBFrameCount => Action::SetBFrameCount {
            count: fields.integer("value")?,
        },
        DirectiveKind::SceneChangeHint => Action::SceneChangeHint {
            look_ahead: fields.integer("value")?,
        },
        DirectiveKind::InsertKeyFrame => Action::InsertKeyFrame,
        DirectiveKind::MarkLongTermReference => Action::MarkLongTermReference,
        DirectiveKind::UseLongTermReference => Action::UseLongTermReference,
        DirectiveKind::AddRegionOfInterest => {
            let (x, y) = fields.pair("position", ("x", "y"))?;
            let (width, height) = fields.pair("size", ("width", "height"))?;
            let quality = fields.text("quality")?.to_string();
            Action::AddRegionOfInterest(RegionOfInterest {
                x,
                y,
                width,
                height,
                quality,
            })
        }
    };

    fields.finish()?;
    Ok(Directive::new(trigger_frame, action))
}

impl FromStr for Directive {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Cursor over the fields following the kind token
struct Fields<'a> {
    kind: DirectiveKind,
    tokens: Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn malformed(&self, field: &'static str, problem: FieldProblem) -> ParseError {
        ParseError::MalformedField {
            kind: self.kind,
            field,
            problem,
        }
    }

    fn text(&mut self, field: &'static str) -> Result<&'a str, ParseError> {
        match self.tokens.next() {
            None => Err(self.malformed(field, FieldProblem::Missing)),
            Some("") => Err(self.malformed(field, FieldProblem::Empty)),
            Some(token) => Ok(token),
        }
    }

    fn integer<T: FromStr>(&mut self, field: &'static str) -> Result<T, ParseError> {
        let token = self.text(field)?;
        self.to_integer(field, token)
    }

    fn pair(
        &mut self,
        field: &'static str,
        names: (&'static str, &'static str),
    ) -> Result<(u32, u32), ParseError> {
        let token = self.text(field)?;
        let (first, second) = token
            .split_once(PAIR_DELIMITER)
            .ok_or_else(|| self.malformed(field, FieldProblem::NotAPair(token.to_string())))?;
        Ok((
            self.to_integer(names.0, first)?,
            self.to_integer(names.1, second)?,
        ))
    }

    fn to_integer<T: FromStr>(&self, field: &'static str, token: &str) -> Result<T, ParseError> {
        if token.is_empty() {
            return Err(self.malformed(field, FieldProblem::Empty));
        }
        // FromStr would also take a leading '+'
        if !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.malformed(field, FieldProblem::NotAnInteger(token.to_string())));
        }
        token
            .parse()
            .map_err(|_| self.malformed(field, FieldProblem::NotAnInteger(token.to_string())))
    }

    fn finish(mut self) -> Result<(), ParseError> {
        match self.tokens.next() {
            Some(extra) => Err(self.malformed("trailing", FieldProblem::Unexpected(extra.to_string()))),
            None => Ok(()),
        }
    }
}
