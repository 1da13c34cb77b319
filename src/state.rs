use crate::types::Mode;
use serde::Serialize;

/// The display state a client toggles between.
///
/// A plain value: toggling returns the next state rather than mutating a
/// shared flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub mode: Mode,
    pub cycle: Vec<Mode>,
}

impl ViewState {
    /// Starts on the first mode of `cycle`. An empty cycle falls back to
    /// covid/population.
    pub fn new(cycle: &[Mode]) -> Self {
        let cycle = if cycle.is_empty() {
            vec![Mode::Covid, Mode::Population]
        } else {
            cycle.to_vec()
        };
        Self { mode: cycle[0], cycle }
    }

    pub fn toggled(&self) -> Self {
        let next = match self.cycle.iter().position(|&m| m == self.mode) {
            Some(i) => self.cycle[(i + 1) % self.cycle.len()],
            None => self.cycle[0],
        };
        Self { mode: next, cycle: self.cycle.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_between_two_modes() {
        let state = ViewState::new(&[Mode::Covid, Mode::Population]);
        assert_eq!(state.mode, Mode::Covid);
        let state = state.toggled();
        assert_eq!(state.mode, Mode::Population);
        assert_eq!(state.toggled().mode, Mode::Covid);
    }

    #[test]
    fn cycles_through_three_modes() {
        let state = ViewState::new(&[Mode::Fatality, Mode::Covid, Mode::Population]);
        let modes: Vec<Mode> = std::iter::successors(Some(state), |s| Some(s.toggled()))
            .take(4)
            .map(|s| s.mode)
            .collect();
        assert_eq!(modes, vec![Mode::Fatality, Mode::Covid, Mode::Population, Mode::Fatality]);
    }

    #[test]
    fn single_mode_stays_put() {
        let state = ViewState::new(&[Mode::Population]);
        assert_eq!(state.toggled(), state);
    }

    #[test]
    fn empty_cycle_defaults() {
        let state = ViewState::new(&[]);
        assert_eq!(state.cycle, vec![Mode::Covid, Mode::Population]);
    }

    #[test]
    fn mode_outside_cycle_restarts() {
        let state = ViewState { mode: Mode::Fatality, cycle: vec![Mode::Covid, Mode::Population] };
        assert_eq!(state.toggled().mode, Mode::Covid);
    }
}
