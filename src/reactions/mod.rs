//! Stochastic reactions inside agents, coupled to the diffusion field.

mod engine;
mod error;
mod rule;

pub use engine::{Phase, StepContext, StepReport, StochasticReactions, ENV, ENV_PREFIX, NULL};
pub use error::{ReactionError, Side};
pub use rule::{MoleculeId, MoleculeRegistry, ReactionRule, Stoichiometry};

use anyhow::{Context, Result};
use log::info;
use signal_common::{Footprint, ProgramConfig};

/// Compiles a configured reaction program into a fresh engine.
pub fn compile_program(program: &ProgramConfig, footprint: Footprint) -> Result<StochasticReactions> {
    let mut reactions = StochasticReactions::new().with_footprint(footprint);

    for (idx, rule) in program.rules.iter().enumerate() {
        reactions
            .extend(&rule.products[..], &rule.reactants[..], rule.rate)
            .with_context(|| format!("program '{}', rule {}", program.name, idx))?;
        for condition in &rule.conditions {
            reactions
                .add_condition(&condition.molecule, condition.requirement, condition.less, condition.clone)
                .with_context(|| format!("program '{}', rule {}, condition on '{}'", program.name, idx, condition.molecule))?;
        }
    }

    info!(
        "[reactions] Program '{}': {} rules over {} molecules",
        program.name,
        reactions.rule_count(),
        reactions.molecules().len()
    );
    Ok(reactions)
}
