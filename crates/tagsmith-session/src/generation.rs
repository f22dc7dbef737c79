//! Monotonic run tags for discarding superseded results.

/// Counter advanced once per upload. Results carry the generation they
/// were started under; only the current generation may be applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Generation(u64);

impl Generation {
    /// Start a new run and return its tag.
    pub const fn advance(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }

    /// Tag of the most recent run. Zero before the first.
    #[must_use]
    pub const fn current(self) -> u64 {
        self.0
    }

    /// Whether `tag` belongs to the most recent run.
    #[must_use]
    pub const fn is_current(self, tag: u64) -> bool {
        self.0 != 0 && tag == self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_monotonically() {
        let mut g = Generation::default();
        assert_eq!(g.current(), 0);
        assert_eq!(g.advance(), 1);
        assert_eq!(g.advance(), 2);
        assert!(g.is_current(2));
        assert!(!g.is_current(1));
    }

    #[test]
    fn nothing_is_current_before_first_run() {
        assert!(!Generation::default().is_current(0));
    }
}
