//! Termination and rejection taxonomy.

use serde::Serialize;
use std::fmt;

/// Outcome of one step. Everything except [`Termination::Continue`] ends growth in the current direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Termination {
    Continue,
    EnterCgm,
    CalibrateFail,
    ExitImage,
    EnterCsf,
    BadSignal,
    HighCurvature,
    LengthExceed,
    TermInSgm,
    ExitSgm,
    ExitMask,
    EnterExclude,
    TraverseAllInclude,
}

impl Termination {
    pub const COUNT: usize = 13;

    pub const ALL: [Termination; Self::COUNT] = [
        Termination::Continue,
        Termination::EnterCgm,
        Termination::CalibrateFail,
        Termination::ExitImage,
        Termination::EnterCsf,
        Termination::BadSignal,
        Termination::HighCurvature,
        Termination::LengthExceed,
        Termination::TermInSgm,
        Termination::ExitSgm,
        Termination::ExitMask,
        Termination::EnterExclude,
        Termination::TraverseAllInclude,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_terminal(self) -> bool {
        self != Termination::Continue
    }

    /// Whether the position reached by this step is appended to the path.
    pub fn adds_point(self) -> bool {
        matches!(
            self,
            Termination::Continue
                | Termination::EnterCgm
                | Termination::EnterCsf
                | Termination::TermInSgm
                | Termination::ExitSgm
                | Termination::TraverseAllInclude
        )
    }

    /// Only produced when tissue data is consulted.
    pub fn is_act_only(self) -> bool {
        matches!(
            self,
            Termination::EnterCgm
                | Termination::EnterCsf
                | Termination::TermInSgm
                | Termination::ExitSgm
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Termination::Continue => "Unknown",
            Termination::EnterCgm => "Entered cortical grey matter",
            Termination::CalibrateFail => "Calibrator failed",
            Termination::ExitImage => "Exited image",
            Termination::EnterCsf => "Entered CSF",
            Termination::BadSignal => "Bad diffusion signal",
            Termination::HighCurvature => "Excessive curvature",
            Termination::LengthExceed => "Max length exceeded",
            Termination::TermInSgm => "Terminated in subcortex",
            Termination::ExitSgm => "Exiting sub-cortical GM",
            Termination::ExitMask => "Exited mask",
            Termination::EnterExclude => "Entered exclusion region",
            Termination::TraverseAllInclude => "Traversed all include regions",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a path was discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Rejection {
    /// Seed failed the step source's start check (finite seed sources only).
    InvalidSeed,
    ActPoorTermination,
    TrackTooLong,
    EnterExcludeRegion,
    TrackTooShort,
    ActFailedWmRequirement,
    MissedIncludeRegion,
}

impl Rejection {
    pub const COUNT: usize = 7;

    pub const ALL: [Rejection; Self::COUNT] = [
        Rejection::InvalidSeed,
        Rejection::ActPoorTermination,
        Rejection::TrackTooLong,
        Rejection::EnterExcludeRegion,
        Rejection::TrackTooShort,
        Rejection::ActFailedWmRequirement,
        Rejection::MissedIncludeRegion,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Rejection implied by a termination that discards the path while it is still growing.
    pub fn from_termination(term: Termination) -> Option<Rejection> {
        match term {
            Termination::CalibrateFail
            | Termination::EnterCsf
            | Termination::BadSignal
            | Termination::HighCurvature => Some(Rejection::ActPoorTermination),
            Termination::LengthExceed => Some(Rejection::TrackTooLong),
            Termination::EnterExclude => Some(Rejection::EnterExcludeRegion),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Rejection::InvalidSeed => "Invalid seed point",
            Rejection::ActPoorTermination => "Poor structural termination",
            Rejection::TrackTooLong => "Exceeded maximum length",
            Rejection::EnterExcludeRegion => "Entered exclusion region",
            Rejection::TrackTooShort => "Shorter than minimum length",
            Rejection::ActFailedWmRequirement => "Failed to traverse white matter",
            Rejection::MissedIncludeRegion => "Missed inclusion region",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_tables_are_in_index_order() {
        for (i, t) in Termination::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
        for (i, r) in Rejection::ALL.iter().enumerate() {
            assert_eq!(r.index(), i);
        }
    }

    #[test]
    fn neutral_stops_do_not_imply_rejection() {
        for t in [
            Termination::ExitImage,
            Termination::ExitMask,
            Termination::EnterCgm,
            Termination::ExitSgm,
            Termination::TermInSgm,
            Termination::TraverseAllInclude,
        ] {
            assert_eq!(Rejection::from_termination(t), None, "{t:?}");
        }
    }
}
