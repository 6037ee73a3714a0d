/// Which operand list of a rule an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Reactants,
    Products,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Reactants => f.write_str("reactants"),
            Side::Products => f.write_str("products"),
        }
    }
}

/// Rejected rule compilation. The engine is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactionError {
    #[error("'env' must be the only operand in {0}")]
    EnvNotAlone(Side),
    #[error("'env' cannot be both reactant and product")]
    EnvOnBothSides,
    #[error("'{0}' is not allowed in an environment transfer")]
    InvalidTransferOperand(String),
    #[error("condition on '{0}' has no rule to attach to")]
    NoRuleForCondition(String),
    #[error("empty molecule name")]
    EmptyMoleculeName,
}
