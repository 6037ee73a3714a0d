use std::collections::HashMap;
use std::fmt;

/// Dense molecule index, assigned on first use by a [`MoleculeRegistry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MoleculeId(pub u32);

impl MoleculeId {
    #[inline(always)]
    pub fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for MoleculeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Name to column mapping. Only ever grows.
#[derive(Debug, Clone, Default)]
pub struct MoleculeRegistry {
    names: Vec<String>,
    index: HashMap<String, MoleculeId>,
}

impl MoleculeRegistry {
    #[inline(always)]
    pub fn len(&self) -> usize { self.names.len() }

    #[inline(always)]
    pub fn is_empty(&self) -> bool { self.names.is_empty() }

    pub fn get(&self, name: &str) -> Option<MoleculeId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: MoleculeId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MoleculeId, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (MoleculeId(i as u32), n.as_str()))
    }

    /// Returns the id of `name` and whether it was newly registered.
    pub(crate) fn get_or_insert(&mut self, name: &str) -> (MoleculeId, bool) {
        if let Some(&id) = self.index.get(name) {
            return (id, false);
        }
        let id = MoleculeId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        (id, true)
    }
}

/// Requirement and product of one molecule in one rule.
///
/// `requirement` doubles as the guard threshold: the rule is enabled when the
/// amount is at least (or, with `less`, at most) the requirement. The same
/// holds for the environmental pair with `env_less`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stoichiometry {
    pub requirement: u64,
    pub product: u64,
    pub env_requirement: f64,
    pub env_product: f64,
    pub less: bool,
    pub env_less: bool,
}

impl Stoichiometry {
    /// Whether the rule's propensity depends on this molecule.
    #[inline(always)]
    pub fn references(&self) -> bool {
        self.requirement != 0 || self.less || self.env_requirement != 0.0 || self.env_less
    }

    #[inline(always)]
    pub fn delta(&self) -> i64 {
        self.product as i64 - self.requirement as i64
    }

    #[inline(always)]
    pub fn env_delta(&self) -> f64 {
        self.env_product - self.env_requirement
    }

    /// Guard on the intracellular count.
    #[inline(always)]
    pub fn admits(&self, count: u64) -> bool {
        if self.less { count <= self.requirement } else { count >= self.requirement }
    }

    /// Guard on the environmental amount; `scale` converts the requirement
    /// into field units. A zero at-least requirement always holds.
    #[inline(always)]
    pub fn admits_env(&self, amount: f64, scale: f64) -> bool {
        if self.env_less {
            amount <= self.env_requirement * scale
        } else {
            self.env_requirement == 0.0 || amount >= self.env_requirement * scale
        }
    }
}

/// One row of the rule table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionRule {
    pub rate: f64,
    entries: Vec<Stoichiometry>,
}

impl ReactionRule {
    pub fn new(rate: f64, width: usize) -> Self {
        Self { rate, entries: vec![Stoichiometry::default(); width] }
    }

    #[inline(always)]
    pub fn width(&self) -> usize { self.entries.len() }

    #[inline(always)]
    pub fn entries(&self) -> &[Stoichiometry] { &self.entries }

    #[inline(always)]
    pub fn entry(&self, id: MoleculeId) -> &Stoichiometry { &self.entries[id.index()] }

    #[inline(always)]
    pub fn entry_mut(&mut self, id: MoleculeId) -> &mut Stoichiometry { &mut self.entries[id.index()] }

    /// Appends zero columns up to `width`.
    pub(crate) fn widen(&mut self, width: usize) {
        if self.entries.len() < width {
            self.entries.resize(width, Stoichiometry::default());
        }
    }

    /// Propensity under the given amounts: zero if any guard fails, otherwise
    /// the rate times the count of every molecule with a nonzero requirement.
    pub fn propensity(&self, counts: &[u64], env: &[f64], env_scale: f64) -> f64 {
        let mut local = self.rate;
        for (m, e) in self.entries.iter().enumerate() {
            if !e.references() {
                continue;
            }
            let count = counts[m];
            if !e.admits(count) || !e.admits_env(env[m], env_scale) {
                return 0.0;
            }
            if e.requirement != 0 {
                local *= count as f64;
            }
        }
        local
    }

    /// Molecules whose intracellular count changes when the rule fires.
    pub fn deltas(&self) -> impl Iterator<Item = (MoleculeId, i64)> + '_ {
        self.entries.iter().enumerate().filter_map(|(m, e)| {
            let d = e.delta();
            (d != 0).then_some((MoleculeId(m as u32), d))
        })
    }

    /// Molecules whose environmental amount changes when the rule fires.
    pub fn env_deltas(&self) -> impl Iterator<Item = (MoleculeId, f64)> + '_ {
        self.entries.iter().enumerate().filter_map(|(m, e)| {
            let d = e.env_delta();
            (d != 0.0).then_some((MoleculeId(m as u32), d))
        })
    }
}
