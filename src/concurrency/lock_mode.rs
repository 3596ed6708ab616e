//! The lock mode algebra.
//!
//! Three pure relations drive every decision the lock layer makes:
//!
//! - *compatibility*: can two transactions hold these modes on the same
//!   resource at the same time?
//! - *substitutability*: does holding one mode grant at least the rights
//!   of another?
//! - *parent legality*: which modes on a parent resource permit a given
//!   mode on a child?

/// A lock mode over a named resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum LockMode {
    /// No lock.
    NL,
    /// Intention to take shared locks on descendants.
    IS,
    /// Intention to take exclusive locks on descendants.
    IX,
    /// Shared: read this resource and everything below it.
    S,
    /// Shared plus intention-exclusive: read everything below, with
    /// exclusive locks to come on some descendants.
    SIX,
    /// Exclusive: read and write this resource and everything below it.
    X,
}

impl LockMode {
    /// Whether `a` and `b` may be held on the same resource by two
    /// different transactions. Symmetric.
    #[must_use]
    pub const fn compatible(a: Self, b: Self) -> bool {
        match (a, b) {
            (Self::NL, _) | (_, Self::NL) => true,
            (Self::IS, Self::X) | (Self::X, Self::IS) => false,
            (Self::IS, _) | (_, Self::IS) => true,
            (Self::IX, Self::IX) => true,
            (Self::S, Self::S) => true,
            _ => false,
        }
    }

    /// Whether holding `substitute` grants at least the rights of
    /// `required`. Reflexive; not symmetric.
    ///
    /// Note the asymmetries that matter in practice: SIX substitutes for
    /// both S and IX, but S does not substitute for IX.
    #[must_use]
    pub const fn substitutable(substitute: Self, required: Self) -> bool {
        match (substitute, required) {
            (_, Self::NL) => true,
            (Self::X, _) => true,
            (Self::SIX, Self::S | Self::IX | Self::IS | Self::SIX) => true,
            (Self::S, Self::S | Self::IS) => true,
            (Self::IX, Self::IX | Self::IS) => true,
            (Self::IS, Self::IS) => true,
            _ => false,
        }
    }

    /// Whether holding `parent` on a resource permits holding `child` on
    /// one of its children.
    #[must_use]
    pub const fn can_be_parent(parent: Self, child: Self) -> bool {
        match child {
            Self::NL => true,
            Self::IS | Self::S => matches!(parent, Self::IS | Self::IX),
            Self::IX | Self::SIX | Self::X => matches!(parent, Self::IX | Self::SIX),
        }
    }

    /// Whether this is an intent mode (IS, IX, or SIX).
    #[must_use]
    pub const fn is_intent(self) -> bool {
        matches!(self, Self::IS | Self::IX | Self::SIX)
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NL => "NL",
            Self::IS => "IS",
            Self::IX => "IX",
            Self::S => "S",
            Self::SIX => "SIX",
            Self::X => "X",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::LockMode::{IS, IX, NL, S, SIX, X};
    use super::*;

    const ALL: [LockMode; 6] = [NL, IS, IX, S, SIX, X];

    #[test]
    fn test_compatibility_matrix() {
        // Row-by-row against the definition.
        for mode in ALL {
            assert!(LockMode::compatible(NL, mode));
        }
        assert!(LockMode::compatible(IS, IS));
        assert!(LockMode::compatible(IS, IX));
        assert!(LockMode::compatible(IS, S));
        assert!(LockMode::compatible(IS, SIX));
        assert!(!LockMode::compatible(IS, X));

        assert!(LockMode::compatible(IX, IX));
        assert!(!LockMode::compatible(IX, S));
        assert!(!LockMode::compatible(IX, SIX));
        assert!(!LockMode::compatible(IX, X));

        assert!(LockMode::compatible(S, S));
        assert!(!LockMode::compatible(S, SIX));
        assert!(!LockMode::compatible(S, X));

        assert!(!LockMode::compatible(SIX, SIX));
        assert!(!LockMode::compatible(SIX, X));

        assert!(!LockMode::compatible(X, X));
    }

    #[test]
    fn test_compatibility_is_symmetric() {
        for a in ALL {
            for b in ALL {
                assert_eq!(
                    LockMode::compatible(a, b),
                    LockMode::compatible(b, a),
                    "compatibility must be symmetric for {a}/{b}"
                );
            }
        }
    }

    #[test]
    fn test_substitutability_is_reflexive() {
        for mode in ALL {
            assert!(LockMode::substitutable(mode, mode));
        }
    }

    #[test]
    fn test_substitutability_matrix() {
        for mode in ALL {
            assert!(LockMode::substitutable(X, mode));
            assert!(LockMode::substitutable(mode, NL));
        }
        assert!(LockMode::substitutable(SIX, S));
        assert!(LockMode::substitutable(SIX, IX));
        assert!(LockMode::substitutable(SIX, IS));
        assert!(!LockMode::substitutable(SIX, X));

        assert!(LockMode::substitutable(S, IS));
        assert!(!LockMode::substitutable(S, IX));
        assert!(!LockMode::substitutable(S, X));

        assert!(LockMode::substitutable(IX, IS));
        assert!(!LockMode::substitutable(IX, S));

        assert!(!LockMode::substitutable(IS, IX));
        assert!(!LockMode::substitutable(NL, IS));
    }

    #[test]
    fn test_parent_legality() {
        assert!(LockMode::can_be_parent(IS, S));
        assert!(LockMode::can_be_parent(IX, S));
        assert!(!LockMode::can_be_parent(S, S));
        assert!(!LockMode::can_be_parent(NL, S));

        assert!(LockMode::can_be_parent(IX, X));
        assert!(LockMode::can_be_parent(SIX, X));
        assert!(!LockMode::can_be_parent(IS, X));

        assert!(LockMode::can_be_parent(IS, IS));
        assert!(LockMode::can_be_parent(IX, IS));
        assert!(!LockMode::can_be_parent(SIX, IS));

        assert!(LockMode::can_be_parent(IX, IX));
        assert!(LockMode::can_be_parent(SIX, IX));
        assert!(!LockMode::can_be_parent(IS, IX));

        assert!(LockMode::can_be_parent(IX, SIX));
        assert!(LockMode::can_be_parent(SIX, SIX));
        assert!(!LockMode::can_be_parent(S, SIX));
    }

    #[test]
    fn test_nl_child_is_always_legal() {
        for parent in ALL {
            assert!(LockMode::can_be_parent(parent, NL));
        }
    }

    #[test]
    fn test_intent_modes() {
        assert!(IS.is_intent());
        assert!(IX.is_intent());
        assert!(SIX.is_intent());
        assert!(!NL.is_intent());
        assert!(!S.is_intent());
        assert!(!X.is_intent());
    }
}
