use super::error::{ReactionError, Side};
use super::rule::{MoleculeId, MoleculeRegistry, ReactionRule};
use crate::agent::Agent;
use crate::diffusion::{DiffusionField, SignalId};
use crate::grid::Coordinate;
use crate::rasterizer::cell_footprint;
use log::{debug, trace, warn};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use signal_common::Footprint;

/// Reactant/product name meaning "the environment" as a whole.
pub const ENV: &str = "env";
/// Placeholder for an empty operand.
pub const NULL: &str = "null";
/// Prefix marking a single operand as environmental.
pub const ENV_PREFIX: &str = "env_";

/// Where an engine is within its per-call state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No propensities computed yet.
    Uninitialized,
    /// Propensities are current; the next reaction may be drawn.
    Ready,
    /// A selected rule is being applied.
    Firing,
    /// Nothing more fits into the current call.
    Quiescent,
}

/// Shared state an engine reads and writes during a step.
pub struct StepContext<'a> {
    /// Environment; without it the agent has no environmental coupling.
    pub field: Option<&'a mut DiffusionField>,
    /// Field amount written per molecule moved into the environment.
    pub env_unit_conversion: f64,
}

impl<'a> StepContext<'a> {
    pub fn new(field: &'a mut DiffusionField, env_unit_conversion: f64) -> Self {
        Self { field: Some(field), env_unit_conversion }
    }

    pub fn isolated() -> Self {
        Self { field: None, env_unit_conversion: 1.0 }
    }
}

/// Outcome of one [`StochasticReactions::step`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepReport {
    pub firings: u64,
    /// Virtual time consumed by the fired reactions, never more than `dt`.
    pub elapsed: f64,
}

/// A single parsed operand of a reaction.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Operand<'a> {
    Null,
    Intra(&'a str),
    Env(&'a str),
}

fn parse_operand(name: &str) -> Result<Operand<'_>, ReactionError> {
    match name {
        "" => Err(ReactionError::EmptyMoleculeName),
        NULL | "env_null" => Ok(Operand::Null),
        _ => match name.strip_prefix(ENV_PREFIX) {
            Some("") => Err(ReactionError::EmptyMoleculeName),
            Some(rest) => Ok(Operand::Env(rest)),
            None => Ok(Operand::Intra(name)),
        },
    }
}

/// Parses a list that must not contain the `env` sentinel.
fn parse_list<'a, S: AsRef<str>>(names: &'a [S]) -> Result<Vec<Operand<'a>>, ReactionError> {
    names.iter().map(|n| parse_operand(n.as_ref())).collect()
}

/// Operands of a pure transfer must be plain intracellular molecules.
fn parse_transfer<'a, S: AsRef<str>>(names: &'a [S]) -> Result<Vec<&'a str>, ReactionError> {
    names
        .iter()
        .map(|n| match parse_operand(n.as_ref())? {
            Operand::Intra(name) => Ok(name),
            _ => Err(ReactionError::InvalidTransferOperand(n.as_ref().to_string())),
        })
        .collect()
}

fn is_env_sentinel<S: AsRef<str>>(names: &[S], side: Side) -> Result<bool, ReactionError> {
    let has_env = names.iter().any(|n| n.as_ref() == ENV);
    if has_env && names.len() != 1 {
        return Err(ReactionError::EnvNotAlone(side));
    }
    Ok(has_env)
}

/// Stochastic reaction network of one agent, coupled to the diffusion field.
///
/// Rules are compiled with [`extend`](Self::extend) and
/// [`add_condition`](Self::add_condition), then [`step`](Self::step) runs a
/// bounded-time direct-method SSA. Propensities stay cached between calls;
/// only rules that reference a molecule whose amount changed are recomputed.
#[derive(Debug, Clone)]
pub struct StochasticReactions {
    molecules: MoleculeRegistry,
    rules: Vec<ReactionRule>,
    /// Last extended rule as it was before any condition.
    unconditioned: Option<ReactionRule>,
    footprint_mode: Footprint,

    // Derived from the rule table, rebuilt after compilation changes
    dependents: Vec<Vec<usize>>,
    compiled: bool,

    phase: Phase,
    propensities: Vec<f64>,
    counts: Vec<u64>,
    env: Vec<f64>,
    env_scale: f64,
    signals: Vec<Option<SignalId>>,
    bound_signal_count: usize,
    warned: Vec<bool>,
    footprint: Vec<Coordinate>,
}

impl Default for StochasticReactions {
    fn default() -> Self {
        Self::new()
    }
}

impl StochasticReactions {
    pub fn new() -> Self {
        Self {
            molecules: MoleculeRegistry::default(),
            rules: Vec::new(),
            unconditioned: None,
            footprint_mode: Footprint::default(),
            dependents: Vec::new(),
            compiled: false,
            phase: Phase::Uninitialized,
            propensities: Vec::new(),
            counts: Vec::new(),
            env: Vec::new(),
            env_scale: 1.0,
            signals: Vec::new(),
            bound_signal_count: 0,
            warned: Vec::new(),
            footprint: Vec::new(),
        }
    }

    pub fn with_footprint(mut self, mode: Footprint) -> Self {
        self.footprint_mode = mode;
        self
    }

    pub fn set_footprint_mode(&mut self, mode: Footprint) {
        self.footprint_mode = mode;
    }

    #[inline(always)]
    pub fn footprint_mode(&self) -> Footprint { self.footprint_mode }

    #[inline(always)]
    pub fn molecules(&self) -> &MoleculeRegistry { &self.molecules }

    #[inline(always)]
    pub fn rule_count(&self) -> usize { self.rules.len() }

    pub fn rule(&self, idx: usize) -> Option<&ReactionRule> { self.rules.get(idx) }

    pub fn rate(&self, idx: usize) -> Option<f64> { self.rules.get(idx).map(|r| r.rate) }

    /// Cached propensities; empty until the first step.
    #[inline(always)]
    pub fn propensities(&self) -> &[f64] { &self.propensities }

    #[inline(always)]
    pub fn phase(&self) -> Phase { self.phase }

    /// Footprint used by the most recent step.
    #[inline(always)]
    pub fn footprint(&self) -> &[Coordinate] { &self.footprint }

    /// Drops the propensity cache; the next step recomputes everything.
    pub fn reset(&mut self) {
        self.phase = Phase::Uninitialized;
    }

    /// Adds a rule turning `reactants` into `products` and returns its index.
    ///
    /// A list consisting solely of `env` describes a pure transfer across the
    /// membrane: `env -> X` absorbs from the field, `X -> env` excretes into
    /// it. Otherwise operands prefixed with `env_` are environmental, and
    /// `null`/`env_null` are empty placeholders.
    pub fn extend<S: AsRef<str>>(&mut self, products: &[S], reactants: &[S], rate: f64) -> Result<usize, ReactionError> {
        let absorb = is_env_sentinel(reactants, Side::Reactants)?;
        let excrete = is_env_sentinel(products, Side::Products)?;

        // (operand, true for the requirement side)
        let changes: Vec<(Operand<'_>, bool)> = match (absorb, excrete) {
            (true, true) => return Err(ReactionError::EnvOnBothSides),
            (true, false) => parse_transfer(products)?
                .into_iter()
                .flat_map(|n| [(Operand::Env(n), true), (Operand::Intra(n), false)])
                .collect(),
            (false, true) => parse_transfer(reactants)?
                .into_iter()
                .flat_map(|n| [(Operand::Intra(n), true), (Operand::Env(n), false)])
                .collect(),
            (false, false) => {
                let reactants = parse_list(reactants)?;
                let products = parse_list(products)?;
                reactants
                    .into_iter()
                    .map(|op| (op, true))
                    .chain(products.into_iter().map(|op| (op, false)))
                    .collect()
            }
        };
        let row = self.build_row(rate, &changes);

        self.unconditioned = Some(row.clone());
        self.rules.push(row);
        self.invalidate();

        let idx = self.rules.len() - 1;
        debug!(
            "[reactions] Rule {}: {:?} -> {:?} at rate {}",
            idx,
            reactants.iter().map(AsRef::as_ref).collect::<Vec<_>>(),
            products.iter().map(AsRef::as_ref).collect::<Vec<_>>(),
            rate
        );
        Ok(idx)
    }

    /// Tightens the guard of the last rule on `molecule` (environmental when
    /// prefixed with `env_`): the rule is enabled while the amount is at least
    /// `requirement`, or at most with `less`.
    ///
    /// With `clone`, the unconditioned form of the last extended rule is first
    /// appended as a new row, so consecutive conditions on fresh clones express
    /// alternatives.
    pub fn add_condition(&mut self, molecule: &str, requirement: f64, less: bool, clone: bool) -> Result<(), ReactionError> {
        let operand = parse_operand(molecule)?;
        if self.rules.is_empty() {
            return Err(ReactionError::NoRuleForCondition(molecule.to_string()));
        }

        if clone {
            let rate = self.rules[self.rules.len() - 1].rate;
            if let Some(mut row) = self.unconditioned.clone() {
                row.rate = rate;
                self.rules.push(row);
            }
        }

        let (id, env) = match operand {
            Operand::Null => {
                self.invalidate();
                return Ok(());
            }
            Operand::Intra(name) => (self.register(name), false),
            Operand::Env(name) => (self.register(name), true),
        };

        let last = self.rules.len() - 1;
        let entry = self.rules[last].entry_mut(id);
        if env {
            let diff = (requirement - entry.env_requirement).max(0.0);
            entry.env_less = less;
            entry.env_requirement += diff;
            entry.env_product += diff;
        } else {
            let threshold = if less { requirement.floor() } else { requirement.ceil() };
            let threshold = threshold.max(0.0) as u64;
            let diff = threshold.saturating_sub(entry.requirement);
            entry.less = less;
            entry.requirement += diff;
            entry.product += diff;
        }
        self.invalidate();

        debug!(
            "[reactions] Rule {}: condition {} {} {}{}",
            last,
            molecule,
            if less { "<=" } else { ">=" },
            requirement,
            if clone { " (clone)" } else { "" }
        );
        Ok(())
    }

    /// Runs reactions for `agent` until the next waiting time would exceed
    /// `dt`.
    pub fn step<A, R>(&mut self, agent: &mut A, ctx: &mut StepContext<'_>, dt: f64, rng: &mut R) -> StepReport
    where
        A: Agent + ?Sized,
        R: Rng,
    {
        let mut report = StepReport::default();
        if self.rules.is_empty() {
            self.phase = Phase::Quiescent;
            return report;
        }
        self.ensure_compiled();

        self.footprint = match ctx.field.as_deref() {
            Some(field) => cell_footprint(
                agent.position(),
                agent.rotation(),
                agent.shapes(),
                field.metrics(),
                self.footprint_mode,
            ),
            None => Vec::new(),
        };
        self.bind_signals(ctx.field.as_deref());

        if self.phase == Phase::Uninitialized || self.env_scale != ctx.env_unit_conversion {
            self.env_scale = ctx.env_unit_conversion;
            self.initialize(agent, ctx.field.as_deref());
        } else {
            self.refresh(agent, ctx.field.as_deref());
        }
        self.phase = Phase::Ready;

        loop {
            let total: f64 = self.propensities.iter().sum();
            if !(total > 0.0) {
                break;
            }
            let tau = match Exp::new(total) {
                Ok(exp) => exp.sample(rng),
                Err(_) => break,
            };
            if report.elapsed + tau > dt {
                break;
            }

            let idx = self.select(rng.random_range(0.0..total));
            self.phase = Phase::Firing;
            self.fire(idx, agent, ctx, rng);
            report.elapsed += tau;
            report.firings += 1;
            self.phase = Phase::Ready;
        }

        self.phase = Phase::Quiescent;
        report
    }

    /// Propensities computed from scratch for the given agent and field,
    /// leaving the cache untouched.
    pub fn evaluate_propensities<A: Agent + ?Sized>(&self, agent: &A, field: Option<&DiffusionField>, env_unit_conversion: f64) -> Vec<f64> {
        let footprint = match field {
            Some(f) => cell_footprint(agent.position(), agent.rotation(), agent.shapes(), f.metrics(), self.footprint_mode),
            None => Vec::new(),
        };
        let counts: Vec<u64> = self.molecules.iter().map(|(_, name)| agent.molecule_count(name)).collect();
        let env: Vec<f64> = self
            .molecules
            .iter()
            .map(|(_, name)| match field.and_then(|f| f.signal_id(name).map(|id| (f, id))) {
                Some((f, id)) => f.mean(id, &footprint),
                None => 0.0,
            })
            .collect();
        self.rules.iter().map(|r| r.propensity(&counts, &env, env_unit_conversion)).collect()
    }

    fn register(&mut self, name: &str) -> MoleculeId {
        let (id, added) = self.molecules.get_or_insert(name);
        if added {
            let width = self.molecules.len();
            for rule in &mut self.rules {
                rule.widen(width);
            }
            if let Some(backup) = &mut self.unconditioned {
                backup.widen(width);
            }
        }
        id
    }

    fn build_row(&mut self, rate: f64, changes: &[(Operand<'_>, bool)]) -> ReactionRule {
        let ids: Vec<_> = changes
            .iter()
            .filter_map(|(op, req)| match *op {
                Operand::Intra(n) => Some((self.register(n), false, *req)),
                Operand::Env(n) => Some((self.register(n), true, *req)),
                Operand::Null => None,
            })
            .collect();

        let mut row = ReactionRule::new(rate, self.molecules.len());
        for (id, env, req) in ids {
            let e = row.entry_mut(id);
            match (env, req) {
                (false, true) => e.requirement += 1,
                (false, false) => e.product += 1,
                (true, true) => e.env_requirement += 1.0,
                (true, false) => e.env_product += 1.0,
            }
        }
        row
    }

    fn invalidate(&mut self) {
        self.compiled = false;
        self.phase = Phase::Uninitialized;
    }

    fn ensure_compiled(&mut self) {
        if self.compiled {
            return;
        }
        let width = self.molecules.len();
        let mut dependents = vec![Vec::new(); width];
        for (idx, rule) in self.rules.iter().enumerate() {
            for (m, e) in rule.entries().iter().enumerate() {
                if e.references() {
                    dependents[m].push(idx);
                }
            }
        }
        self.dependents = dependents;
        self.counts = vec![0; width];
        self.env = vec![0.0; width];
        self.warned = vec![false; width];
        self.signals = vec![None; width];
        self.bound_signal_count = usize::MAX;
        self.propensities = vec![0.0; self.rules.len()];
        self.compiled = true;
        debug!("[reactions] Compiled {} rules over {} molecules", self.rules.len(), width);
    }

    /// Resolves molecule names to signals once per field layout.
    fn bind_signals(&mut self, field: Option<&DiffusionField>) {
        let count = field.map_or(0, DiffusionField::signal_count);
        if count == self.bound_signal_count {
            return;
        }
        for (id, name) in self.molecules.iter() {
            self.signals[id.index()] = field.and_then(|f| f.signal_id(name));
        }
        self.bound_signal_count = count;
    }

    fn read_count<A: Agent + ?Sized>(&self, agent: &A, m: usize) -> u64 {
        self.molecules.name(MoleculeId(m as u32)).map_or(0, |name| agent.molecule_count(name))
    }

    fn read_env(&self, field: Option<&DiffusionField>, m: usize) -> f64 {
        match (field, self.signals[m]) {
            (Some(f), Some(id)) => f.mean(id, &self.footprint),
            _ => 0.0,
        }
    }

    fn initialize<A: Agent + ?Sized>(&mut self, agent: &A, field: Option<&DiffusionField>) {
        for m in 0..self.molecules.len() {
            self.counts[m] = self.read_count(agent, m);
            self.env[m] = self.read_env(field, m);
        }
        for (idx, rule) in self.rules.iter().enumerate() {
            self.propensities[idx] = rule.propensity(&self.counts, &self.env, self.env_scale);
        }
        trace!("[reactions] Initialized propensities {:?}", self.propensities);
    }

    /// Re-reads every amount and recomputes the rules that depend on the
    /// ones that moved since the last call.
    fn refresh<A: Agent + ?Sized>(&mut self, agent: &A, field: Option<&DiffusionField>) {
        let mut changed = Vec::new();
        for m in 0..self.molecules.len() {
            let count = self.read_count(agent, m);
            let env = self.read_env(field, m);
            if count != self.counts[m] || env != self.env[m] {
                self.counts[m] = count;
                self.env[m] = env;
                changed.push(m);
            }
        }
        self.recompute(&changed);
    }

    fn recompute(&mut self, molecules: &[usize]) {
        let mut seen = vec![false; self.rules.len()];
        for &m in molecules {
            for &idx in &self.dependents[m] {
                if !seen[idx] {
                    seen[idx] = true;
                    self.propensities[idx] = self.rules[idx].propensity(&self.counts, &self.env, self.env_scale);
                }
            }
        }
    }

    /// First rule whose cumulative propensity exceeds `u`.
    fn select(&self, u: f64) -> usize {
        let mut acc = 0.0;
        let mut last_enabled = 0;
        for (idx, &p) in self.propensities.iter().enumerate() {
            if p > 0.0 {
                acc += p;
                last_enabled = idx;
                if acc > u {
                    return idx;
                }
            }
        }
        // Rounding left `u` past the accumulated sum
        last_enabled
    }

    fn fire<A, R>(&mut self, idx: usize, agent: &mut A, ctx: &mut StepContext<'_>, rng: &mut R)
    where
        A: Agent + ?Sized,
        R: Rng,
    {
        let mut touched = Vec::new();
        let rule = &self.rules[idx];

        for (m, delta) in rule.deltas() {
            let Some(name) = self.molecules.name(m) else { continue };
            agent.change_molecule_count(name, delta);
            self.counts[m.index()] = agent.molecule_count(name);
            touched.push(m.index());
        }

        for (m, delta) in rule.env_deltas() {
            let Some(field) = ctx.field.as_deref_mut() else { continue };
            let Some(signal) = self.signals[m.index()] else {
                if !self.warned[m.index()] {
                    self.warned[m.index()] = true;
                    warn!(
                        "[reactions] No signal for molecule '{}'; environmental change ignored",
                        self.molecules.name(m).unwrap_or_default()
                    );
                }
                continue;
            };
            if self.footprint.is_empty() {
                continue;
            }
            let coord = self.footprint[rng.random_range(0..self.footprint.len())];
            field.add(signal, coord, delta * ctx.env_unit_conversion);
            self.env[m.index()] = field.mean(signal, &self.footprint);
            touched.push(m.index());
        }

        trace!("[reactions] Fired rule {} touching {} molecules", idx, touched.len());
        self.recompute(&touched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Cell;
    use crate::grid::GridSize;
    use crate::reactions::rule::Stoichiometry;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use signal_common::{Shape, Vec2};

    fn entry(engine: &StochasticReactions, rule: usize, name: &str) -> Stoichiometry {
        let id = engine.molecules().get(name).unwrap();
        *engine.rule(rule).unwrap().entry(id)
    }

    fn cell(counts: &[(&str, u64)]) -> Cell {
        counts
            .iter()
            .fold(Cell::new("c", Vec2::zero(), vec![]), |c, (name, n)| c.with_molecule(name, *n))
    }

    #[test]
    fn extend_builds_rows_and_widens_old_ones() {
        let mut r = StochasticReactions::new();
        assert_eq!(r.extend(&["B"], &["A", "A"], 1.0), Ok(0));
        assert_eq!(entry(&r, 0, "A").requirement, 2);
        assert_eq!(entry(&r, 0, "B").product, 1);

        r.extend(&["C"], &["null"], 0.5).unwrap();
        assert_eq!(r.molecules().len(), 3);
        assert_eq!(r.rule(0).unwrap().width(), 3);
        assert_eq!(entry(&r, 0, "C"), Default::default());
        assert_eq!(entry(&r, 1, "C").product, 1);
        assert_eq!(r.rate(1), Some(0.5));
    }

    #[test]
    fn pure_transfers() {
        let mut r = StochasticReactions::new();
        r.extend(&["A"], &["env"], 1.0).unwrap();
        r.extend(&["env"], &["B"], 1.0).unwrap();

        let absorb = entry(&r, 0, "A");
        assert_eq!((absorb.env_requirement, absorb.product), (1.0, 1));
        let excrete = entry(&r, 1, "B");
        assert_eq!((excrete.requirement, excrete.env_product), (1, 1.0));
    }

    #[test]
    fn mixed_environmental_operands() {
        let mut r = StochasticReactions::new();
        r.extend(&["env_B", "C"], &["A", "env_null"], 1.0).unwrap();
        assert_eq!(entry(&r, 0, "A").requirement, 1);
        assert_eq!(entry(&r, 0, "B").env_product, 1.0);
        assert_eq!(entry(&r, 0, "B").product, 0);
        assert_eq!(entry(&r, 0, "C").product, 1);
        assert!(r.molecules().get("null").is_none());
    }

    #[test]
    fn malformed_rules_leave_engine_untouched() {
        let mut r = StochasticReactions::new();
        assert_eq!(r.extend(&["env", "B"], &["A"], 1.0), Err(ReactionError::EnvNotAlone(Side::Products)));
        assert_eq!(r.extend(&["B"], &["env", "A"], 1.0), Err(ReactionError::EnvNotAlone(Side::Reactants)));
        assert_eq!(r.extend(&["env"], &["env"], 1.0), Err(ReactionError::EnvOnBothSides));
        assert_eq!(
            r.extend(&["null"], &["env"], 1.0),
            Err(ReactionError::InvalidTransferOperand("null".into()))
        );
        assert_eq!(r.extend(&["B"], &[""], 1.0), Err(ReactionError::EmptyMoleculeName));
        assert_eq!(
            r.add_condition("A", 1.0, false, false),
            Err(ReactionError::NoRuleForCondition("A".into()))
        );
        assert_eq!(r.rule_count(), 0);
        assert!(r.molecules().is_empty());
    }

    #[test]
    fn condition_raises_requirement_and_product_together() {
        let mut r = StochasticReactions::new();
        r.extend(&["B"], &["A"], 1.0).unwrap();
        r.add_condition("A", 2.5, false, false).unwrap();
        let a = entry(&r, 0, "A");
        assert_eq!((a.requirement, a.product, a.less), (3, 2, false));
        assert_eq!(a.delta(), -1);

        r.add_condition("env_S", 4.0, true, false).unwrap();
        let s = entry(&r, 0, "S");
        assert_eq!((s.env_requirement, s.env_product, s.env_less), (4.0, 4.0, true));
        assert_eq!(s.env_delta(), 0.0);
    }

    #[test]
    fn clone_appends_unconditioned_branch() {
        let mut r = StochasticReactions::new();
        r.extend(&["B"], &["A"], 2.0).unwrap();
        r.add_condition("X", 5.0, false, false).unwrap();
        r.add_condition("Y", 1.0, true, true).unwrap();

        assert_eq!(r.rule_count(), 2);
        assert_eq!(r.rate(1), Some(2.0));
        assert_eq!(entry(&r, 0, "X").requirement, 5);
        assert_eq!(entry(&r, 0, "Y"), Default::default());
        assert_eq!(entry(&r, 1, "X"), Default::default());
        assert_eq!(entry(&r, 1, "Y").requirement, 1);
        assert!(entry(&r, 1, "Y").less);
        assert_eq!(entry(&r, 1, "A").requirement, 1);
        assert_eq!(r.rule(1).unwrap().width(), r.molecules().len());
    }

    #[test]
    fn guard_blocks_until_threshold() {
        let mut r = StochasticReactions::new();
        r.extend(&["B"], &["A"], 1.0).unwrap();
        r.add_condition("A", 3.0, false, false).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let mut c = cell(&[("A", 2)]);
        let report = r.step(&mut c, &mut StepContext::isolated(), 100.0, &mut rng);
        assert_eq!(report.firings, 0);
        assert_eq!(r.propensities(), &[0.0]);
        assert_eq!(r.phase(), Phase::Quiescent);

        // At 3 molecules the rule fires once and disables itself
        c.molecules.insert("A".into(), 3);
        let report = r.step(&mut c, &mut StepContext::isolated(), 100.0, &mut rng);
        assert_eq!(report.firings, 1);
        assert_eq!(c.molecule_count("A"), 2);
        assert_eq!(c.molecule_count("B"), 1);
    }

    #[test]
    fn decay_fires_once_per_molecule() {
        let mut r = StochasticReactions::new();
        r.extend(&["null"], &["A"], 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut c = cell(&[("A", 5)]);

        let report = r.step(&mut c, &mut StepContext::isolated(), 1.0e6, &mut rng);
        assert_eq!(report.firings, 5);
        assert_eq!(c.molecule_count("A"), 0);
        assert!(report.elapsed <= 1.0e6);
    }

    #[test]
    fn elapsed_time_never_exceeds_dt() {
        let mut r = StochasticReactions::new();
        r.extend(&["A"], &["null"], 50.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut c = cell(&[]);
        for _ in 0..20 {
            let report = r.step(&mut c, &mut StepContext::isolated(), 0.1, &mut rng);
            assert!(report.elapsed <= 0.1);
        }
        assert!(c.molecule_count("A") > 0);
    }

    #[test]
    fn warm_call_notices_external_changes() {
        let mut r = StochasticReactions::new();
        r.extend(&["null"], &["A"], 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mut c = cell(&[]);

        assert_eq!(r.step(&mut c, &mut StepContext::isolated(), 1.0e6, &mut rng).firings, 0);
        c.molecules.insert("A".into(), 3);
        assert_eq!(r.step(&mut c, &mut StepContext::isolated(), 1.0e6, &mut rng).firings, 3);
    }

    #[test]
    fn reset_and_compilation_force_full_recompute() {
        let mut r = StochasticReactions::new();
        r.extend(&["B"], &["A"], 1.0).unwrap();
        assert_eq!(r.phase(), Phase::Uninitialized);
        let mut rng = StdRng::seed_from_u64(5);
        let mut c = cell(&[]);
        r.step(&mut c, &mut StepContext::isolated(), 1.0, &mut rng);
        assert_eq!(r.phase(), Phase::Quiescent);
        r.reset();
        assert_eq!(r.phase(), Phase::Uninitialized);
    }

    fn field_with(signals: &[&str]) -> DiffusionField {
        let mut field = DiffusionField::new(Vec2::new(10.0, 10.0), GridSize::new(10, 10));
        for s in signals {
            field.register_signal(s, 0.0, 0.0);
        }
        field
    }

    #[test]
    fn excretion_writes_into_footprint() {
        let mut field = field_with(&["A"]);
        let mut r = StochasticReactions::new();
        r.extend(&["env"], &["A"], 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let mut c = cell(&[("A", 4)]);

        let report = r.step(&mut c, &mut StepContext::new(&mut field, 0.5), 1.0e6, &mut rng);
        assert_eq!(report.firings, 4);
        assert_eq!(r.footprint(), &[Coordinate::new(5, 5)]);
        assert_eq!(field.get(SignalId(0), Coordinate::new(5, 5)), 2.0);
    }

    #[test]
    fn absorption_drains_the_field() {
        let mut field = field_with(&["A"]);
        field.set(SignalId(0), Coordinate::new(5, 5), 3.0);
        let mut r = StochasticReactions::new();
        r.extend(&["A"], &["env"], 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let mut c = cell(&[]);

        let report = r.step(&mut c, &mut StepContext::new(&mut field, 1.0), 1.0e6, &mut rng);
        assert_eq!(report.firings, 3);
        assert_eq!(c.molecule_count("A"), 3);
        assert_eq!(field.get(SignalId(0), Coordinate::new(5, 5)), 0.0);
    }

    #[test]
    fn molecule_without_signal_is_ignored_in_environment() {
        let mut field = field_with(&[]);
        let mut r = StochasticReactions::new();
        r.extend(&["env"], &["A"], 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(6);
        let mut c = cell(&[("A", 2)]);
        let report = r.step(&mut c, &mut StepContext::new(&mut field, 1.0), 1.0e6, &mut rng);
        assert_eq!(report.firings, 2);
        assert_eq!(c.molecule_count("A"), 0);
    }

    #[test]
    fn environmental_at_most_guard_blocks_above_threshold() {
        let mut field = field_with(&["S"]);
        let s = SignalId(0);
        let centre = Coordinate::new(5, 5);
        let mut r = StochasticReactions::new();
        r.extend(&["B"], &["null"], 1.0).unwrap();
        r.add_condition("env_S", 1.0, true, false).unwrap();
        let mut rng = StdRng::seed_from_u64(12);
        let mut c = cell(&[]);

        field.set(s, centre, 2.0);
        let report = r.step(&mut c, &mut StepContext::new(&mut field, 1.0), 10.0, &mut rng);
        assert_eq!(report.firings, 0);
        assert_eq!(r.propensities(), &[0.0]);

        // Inclusive bound
        field.set(s, centre, 1.0);
        r.step(&mut c, &mut StepContext::new(&mut field, 1.0), 10.0, &mut rng);
        assert_eq!(r.propensities(), &[1.0]);

        field.set(s, centre, 0.5);
        let report = r.step(&mut c, &mut StepContext::new(&mut field, 1.0), 10.0, &mut rng);
        assert!(report.firings > 0);
        assert_eq!(r.propensities(), &[1.0]);
        // The guard itself never moves signal
        assert_eq!(field.get(s, centre), 0.5);

        // Threshold scales with the conversion factor: 0.5 <= 1.0 * 0.25 fails
        let report = r.step(&mut c, &mut StepContext::new(&mut field, 0.25), 10.0, &mut rng);
        assert_eq!(report.firings, 0);
        assert_eq!(r.propensities(), &[0.0]);
    }

    #[test]
    fn footprint_mode_selects_outline_or_area() {
        let mut field = field_with(&["A"]);
        let mut r = StochasticReactions::new();
        r.extend(&["env"], &["A"], 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(10);
        let mut c = Cell::new("round", Vec2::new(0.5, 0.5), vec![Shape::circle(3.0)]);
        let centre = Coordinate::new(5, 5);

        assert_eq!(r.footprint_mode(), Footprint::Border);
        r.step(&mut c, &mut StepContext::new(&mut field, 1.0), 1.0, &mut rng);
        let border = r.footprint().to_vec();
        assert!(!border.contains(&centre));

        r.set_footprint_mode(Footprint::Solid);
        assert_eq!(r.footprint_mode(), Footprint::Solid);
        r.step(&mut c, &mut StepContext::new(&mut field, 1.0), 1.0, &mut rng);
        assert!(r.footprint().contains(&centre));
        assert!(r.footprint().len() > border.len());
    }

    #[test]
    fn agent_outside_world_has_no_environment() {
        let mut field = field_with(&["A"]);
        field.set(SignalId(0), Coordinate::new(0, 0), 5.0);
        let mut r = StochasticReactions::new();
        r.extend(&["A"], &["env"], 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let mut c = Cell::new("far", Vec2::new(100.0, 100.0), vec![]);
        let report = r.step(&mut c, &mut StepContext::new(&mut field, 1.0), 1.0e6, &mut rng);
        assert_eq!(report.firings, 0);
        assert!(r.footprint().is_empty());
    }

    #[derive(Debug, Clone)]
    struct RuleCase {
        reactants: Vec<&'static str>,
        products: Vec<&'static str>,
        rate: f64,
        conditions: Vec<(&'static str, f64, bool, bool)>,
    }

    const OPERANDS: &[&str] = &["A", "B", "C", "env_A", "env_B", "env_C", "null", "env"];

    fn rule_case() -> impl Strategy<Value = RuleCase> {
        let names = prop::collection::vec(prop::sample::select(OPERANDS), 0..3);
        let condition = (
            prop::sample::select(&["A", "B", "C", "env_A", "env_B"][..]),
            0.0f64..4.0,
            any::<bool>(),
            any::<bool>(),
        );
        (names.clone(), names, 0.1f64..2.0, prop::collection::vec(condition, 0..3))
            .prop_map(|(reactants, products, rate, conditions)| RuleCase { reactants, products, rate, conditions })
    }

    proptest! {
        #[test]
        fn cached_propensities_match_full_recompute(
            cases in prop::collection::vec(rule_case(), 1..6),
            counts in prop::collection::vec(0u64..6, 3),
            concentrations in prop::collection::vec(0.0f64..4.0, 18),
            radius in 0.0f32..2.5,
            seed in any::<u64>(),
        ) {
            let mut r = StochasticReactions::new();
            for case in &cases {
                if r.extend(&case.products[..], &case.reactants[..], case.rate).is_ok() {
                    for (name, req, less, clone) in &case.conditions {
                        r.add_condition(name, *req, *less, *clone).unwrap();
                    }
                }
            }

            let mut field = field_with(&["A", "B"]);
            for (i, value) in concentrations.iter().enumerate() {
                let signal = SignalId((i % 2) as u32);
                field.set(signal, Coordinate::new(3 + (i / 2) % 3, 3 + (i / 6)), *value);
            }
            let mut c = Cell::new("c", Vec2::new(-1.0, -1.0), vec![Shape::circle(radius)])
                .with_molecule("A", counts[0])
                .with_molecule("B", counts[1])
                .with_molecule("C", counts[2]);
            let mut rng = StdRng::seed_from_u64(seed);

            for _ in 0..4 {
                r.step(&mut c, &mut StepContext::new(&mut field, 0.5), 0.25, &mut rng);
                let oracle = r.evaluate_propensities(&c, Some(&field), 0.5);
                prop_assert_eq!(r.propensities(), &oracle[..]);
            }
        }
    }
}
