use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Constraint with name '{0}' already exists")]
    DuplicateConstraintName(String),

    #[error("Invalid constraint '{name}': {reason}")]
    InvalidConstraint { name: String, reason: &'static str },

    #[error("Generator constraint unsatisfiable")]
    Unsatisfiable,

    #[error("Variable {0} has no value: it is not constrained or the last solve failed")]
    InvalidRead(u32),

    #[error("Expression node '{0}' cannot be bit-blasted")]
    UnsupportedNode(&'static str),

    #[error("Overlapping range exists")]
    OverlappingRange,

    #[error("Invalid range: {0} > {1}")]
    InvalidRange(i128, i128),

    #[error("Invalid weight {0}: weights must be positive")]
    InvalidWeight(u128),

    #[error("Total distribution weight overflows")]
    WeightOverflow,

    #[error("Vector {vector} has size {size}, larger than the maximum {max}")]
    VectorTooLarge { vector: u32, size: usize, max: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
