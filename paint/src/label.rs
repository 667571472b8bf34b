use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw label value as stored in volumes and tasks.
pub type LabelId = u64;

pub const BACKGROUND: LabelId = 0;
pub const TRANSPARENT: LabelId = u64::MAX;
pub const INVALID: LabelId = u64::MAX - 1;
pub const OUTSIDE: LabelId = u64::MAX - 2;
pub const MAX_ID: LabelId = u64::MAX - 3;

/// Label value with the reserved sentinels split out.
///
/// Volumes and the flood fill inner loop work on raw [`LabelId`]s; this type
/// is what the public API hands out when the distinction matters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Regular(LabelId),
    Background,
    Transparent,
    Invalid,
    Outside,
}

impl Label {
    pub const fn from_raw(raw: LabelId) -> Self {
        match raw {
            BACKGROUND => Label::Background,
            TRANSPARENT => Label::Transparent,
            INVALID => Label::Invalid,
            OUTSIDE => Label::Outside,
            id => Label::Regular(id),
        }
    }

    pub const fn raw(self) -> LabelId {
        match self {
            Label::Regular(id) => id,
            Label::Background => BACKGROUND,
            Label::Transparent => TRANSPARENT,
            Label::Invalid => INVALID,
            Label::Outside => OUTSIDE,
        }
    }

    pub const fn is_regular(self) -> bool {
        matches!(self, Label::Regular(_))
    }

    /// Whether the value names an actual fragment of the label volume.
    pub const fn is_fragment(self) -> bool {
        matches!(self, Label::Regular(_) | Label::Background)
    }

    /// Whether a paint stroke may start on this value.
    pub const fn is_paintable(self) -> bool {
        !matches!(self, Label::Transparent | Label::Invalid | Label::Outside)
    }
}

impl From<LabelId> for Label {
    fn from(raw: LabelId) -> Self {
        Label::from_raw(raw)
    }
}

impl From<Label> for LabelId {
    fn from(label: Label) -> Self {
        label.raw()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Regular(id) => write!(f, "{id}"),
            Label::Background => f.write_str("background"),
            Label::Transparent => f.write_str("transparent"),
            Label::Invalid => f.write_str("invalid"),
            Label::Outside => f.write_str("outside"),
        }
    }
}
