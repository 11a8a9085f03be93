//! Nested transaction bookkeeping

use std::fmt;
use std::panic::Location;

/// Where an inner transaction was rolled back without a save point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackSite {
    /// Transaction level the rollback left
    pub level: u32,
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl RollbackSite {
    /// Record a call site
    pub fn new(level: u32, location: &'static Location<'static>) -> Self {
        Self {
            level,
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }

    /// Record the caller's location
    #[track_caller]
    pub fn capture(level: u32) -> Self {
        Self::new(level, Location::caller())
    }
}

impl fmt::Display for RollbackSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} (level {})",
            self.file, self.line, self.column, self.level
        )
    }
}

/// What the result of a `transactional` callback means for the transaction
pub trait Outcome {
    /// Whether the transaction should be committed
    fn should_commit(&self) -> bool;
}

impl Outcome for () {
    fn should_commit(&self) -> bool {
        true
    }
}

/// `false` rolls back
impl Outcome for bool {
    fn should_commit(&self) -> bool {
        *self
    }
}

/// `None` rolls back
impl<T> Outcome for Option<T> {
    fn should_commit(&self) -> bool {
        self.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_points_here() {
        let site = RollbackSite::capture(2);
        assert_eq!(site.file, file!());
        assert_eq!(site.line, line!() - 2);
        assert!(site.to_string().ends_with("(level 2)"));
    }

    #[test]
    fn test_outcomes() {
        assert!(().should_commit());
        assert!(!false.should_commit());
        assert!(Some(1).should_commit());
        assert!(!None::<i32>.should_commit());
    }
}
