//! Typed representation of a dynamic-feature descriptor

use std::fmt;

/// The kinds of mid-stream change an encoder can be asked to make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    SetBitrate,
    SetGopLength,
    SetBFrameCount,
    InsertKeyFrame,
    AddRegionOfInterest,
    SceneChangeHint,
    MarkLongTermReference,
    UseLongTermReference,
}

/// Descriptor mnemonic for each kind, matched case-sensitively
const VOCABULARY: [(&str, DirectiveKind); 8] = [
    ("BR", DirectiveKind::SetBitrate),
    ("GL", DirectiveKind::SetGopLength),
    ("BFrm", DirectiveKind::SetBFrameCount),
    ("KF", DirectiveKind::InsertKeyFrame),
    ("ROI", DirectiveKind::AddRegionOfInterest),
    ("SC", DirectiveKind::SceneChangeHint),
    ("IL", DirectiveKind::MarkLongTermReference),
    ("UL", DirectiveKind::UseLongTermReference),
];

impl DirectiveKind {
    /// Look up the kind for a descriptor token
    pub fn from_token(token: &str) -> Option<Self> {
        VOCABULARY
            .iter()
            .find(|(mnemonic, _)| *mnemonic == token)
            .map(|(_, kind)| *kind)
    }

    /// The descriptor token for this kind
    pub fn token(self) -> &'static str {
        VOCABULARY
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(mnemonic, _)| *mnemonic)
            .unwrap_or_default()
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Rectangle annotated with an encoding-quality hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionOfInterest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub quality: String,
}

/// Effect of a directive, with the payload its kind requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Target bitrate in kbps
    SetBitrate { kbps: u32 },
    SetGopLength { length: u32 },
    SetBFrameCount { count: u32 },
    InsertKeyFrame,
    AddRegionOfInterest(RegionOfInterest),
    /// Scene change expected within `look_ahead` frames
    SceneChangeHint { look_ahead: u32 },
    MarkLongTermReference,
    UseLongTermReference,
}

impl Action {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Action::SetBitrate { .. } => DirectiveKind::SetBitrate,
            Action::SetGopLength { .. } => DirectiveKind::SetGopLength,
            Action::SetBFrameCount { .. } => DirectiveKind::SetBFrameCount,
            Action::InsertKeyFrame => DirectiveKind::InsertKeyFrame,
            Action::AddRegionOfInterest(_) => DirectiveKind::AddRegionOfInterest,
            Action::SceneChangeHint { .. } => DirectiveKind::SceneChangeHint,
            Action::MarkLongTermReference => DirectiveKind::MarkLongTermReference,
            Action::UseLongTermReference => DirectiveKind::UseLongTermReference,
        }
    }
}

/// One dynamic feature bound to the frame index that activates it.
///
/// Immutable once built; obtain one from [`crate::dynamic::parse`] or
/// [`Directive::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    trigger_frame: u64,
    action: Action,
}

impl Directive {
    pub fn new(trigger_frame: u64, action: Action) -> Self {
        Self {
            trigger_frame,
            action,
        }
    }

    /// Zero-based index of the frame the effect fires on
    pub fn trigger_frame(&self) -> u64 {
        self.trigger_frame
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn kind(&self) -> DirectiveKind {
        self.action.kind()
    }
}

/// Renders the canonical descriptor, e.g. `ROI:10:50x60:40x40:high`
impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.trigger_frame)?;
        match &self.action {
            Action::SetBitrate { kbps: value }
            | Action::SetGopLength { length: value }
            | Action::SetBFrameCount { count: value }
            | Action::SceneChangeHint { look_ahead: value } => write!(f, ":{}", value),
            Action::AddRegionOfInterest(roi) => write!(
                f,
                ":{}x{}:{}x{}:{}",
                roi.x, roi.y, roi.width, roi.height, roi.quality
            ),
            Action::InsertKeyFrame
            | Action::MarkLongTermReference
            | Action::UseLongTermReference => Ok(()),
        }
    }
}
