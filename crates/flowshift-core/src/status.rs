use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one instance migration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationState {
    Planned,
    Validating,
    Matched,
    Transformed,
    Committed,
    Rejected,
}

impl MigrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Rejected)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planned => "planned",
            Self::Validating => "validating",
            Self::Matched => "matched",
            Self::Transformed => "transformed",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Pipeline events that move an instance migration forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStep {
    /// The instance was loaded and checked against the plan's source definition.
    Validate,
    /// Every activity, transition and event-scope instance has an instruction.
    Match,
    /// The new tree and all facets were computed and accepted.
    Transform,
    /// The store accepted the migrated snapshot.
    Commit,
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("illegal migration transition: {step:?} in state {state}")]
pub struct IllegalTransition {
    pub state: MigrationState,
    pub step: MigrationStep,
}

/// Derive the state reached by replaying `steps` from `Planned`.
///
/// Stops at the first step that is not allowed in the state reached so far.
pub fn derive_state(steps: &[MigrationStep]) -> Result<MigrationState, IllegalTransition> {
    steps
        .iter()
        .try_fold(MigrationState::Planned, |state, step| {
            derive_next_state(state, *step)
        })
}

/// Apply one step. Rejection is only possible before the transform is accepted.
pub fn derive_next_state(
    state: MigrationState,
    step: MigrationStep,
) -> Result<MigrationState, IllegalTransition> {
    use MigrationState as S;
    use MigrationStep as E;
    match (state, step) {
        (S::Planned, E::Validate) => Ok(S::Validating),
        (S::Validating, E::Match) => Ok(S::Matched),
        (S::Matched, E::Transform) => Ok(S::Transformed),
        (S::Transformed, E::Commit) => Ok(S::Committed),
        (S::Validating | S::Matched, E::Reject) => Ok(S::Rejected),
        (state, step) => Err(IllegalTransition { state, step }),
    }
}

/// Tracks the state of one instance migration as the pipeline advances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    state: MigrationState,
    steps: Vec<MigrationStep>,
}

impl Default for MigrationProgress {
    fn default() -> Self {
        Self {
            state: MigrationState::Planned,
            steps: Vec::new(),
        }
    }
}

impl MigrationProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn advance(&mut self, step: MigrationStep) -> Result<MigrationState, IllegalTransition> {
        self.state = derive_next_state(self.state, step)?;
        self.steps.push(step);
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MigrationStep::*;

    #[test]
    fn happy_path_reaches_committed() {
        assert_eq!(
            derive_state(&[Validate, Match, Transform, Commit]),
            Ok(MigrationState::Committed)
        );
    }

    #[test]
    fn rejection_only_before_transform() {
        assert_eq!(derive_state(&[Validate, Reject]), Ok(MigrationState::Rejected));
        assert_eq!(
            derive_state(&[Validate, Match, Reject]),
            Ok(MigrationState::Rejected)
        );
        assert_eq!(
            derive_state(&[Validate, Match, Transform, Reject]),
            Err(IllegalTransition {
                state: MigrationState::Transformed,
                step: Reject,
            })
        );
        assert_eq!(
            derive_state(&[Reject]),
            Err(IllegalTransition {
                state: MigrationState::Planned,
                step: Reject,
            })
        );
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for step in [Validate, Match, Transform, Commit, Reject] {
            assert!(derive_next_state(MigrationState::Committed, step).is_err());
            assert!(derive_next_state(MigrationState::Rejected, step).is_err());
        }
    }

    #[test]
    fn progress_records_steps() {
        let mut progress = MigrationProgress::new();
        progress.advance(Validate).unwrap();
        progress.advance(Match).unwrap();
        assert_eq!(progress.state(), MigrationState::Matched);
        assert!(progress.advance(Commit).is_err());
        assert_eq!(progress.steps(), &[Validate, Match]);
        assert!(!progress.state().is_terminal());
    }
}
