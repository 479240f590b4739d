use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of an institution in the model's arena.
///
/// Institutions never own one another; every cross-reference between
/// balance sheets goes through one of these identifiers.
///
/// # Examples
///
/// ```
/// use contagion_engine::core::ids::InstitutionId;
///
/// let a = InstitutionId::new(0);
/// let b = InstitutionId::new(1);
/// assert!(a < b);
/// assert_eq!(a.to_string(), "I0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstitutionId(usize);

impl InstitutionId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the institution in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for InstitutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

impl From<usize> for InstitutionId {
    fn from(index: usize) -> Self {
        Self::new(index)
    }
}

/// Index of a contract in the [`ContractBook`](crate::core::contract::ContractBook).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(usize);

impl ContractId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Index of an obligation in the [`ObligationBook`](crate::core::obligation::ObligationBook).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObligationId(usize);

impl ObligationId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObligationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_institution_equality() {
        let a = InstitutionId::new(3);
        let b = InstitutionId::from(3);
        let c = InstitutionId::new(4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(format!("{}", InstitutionId::new(7)), "I7");
        assert_eq!(format!("{}", ContractId::new(12)), "C12");
        assert_eq!(format!("{}", ObligationId::new(0)), "O0");
    }

    #[test]
    fn test_id_serializes_as_bare_index() {
        let json = serde_json::to_string(&ContractId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: ContractId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index(), 42);
    }
}
