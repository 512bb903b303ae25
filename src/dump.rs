//! Human-readable dumps of an analysis fact.
//!
//! The fact region can be rendered as a DOT (Graphviz) graph or as a
//! bracketed text formula. Variable nodes are labeled with the predicate
//! they belong to (`name/bit`) when the name is known to the store.
//!
//! Rendering conventions for DOT output:
//! - terminal node 1 is a square at the bottom (sink rank);
//! - variable nodes are circles, grouped by level (same rank);
//! - solid edges are high (then) branches, dashed edges are low (else)
//!   branches, dotted edges with a hollow circle are negated pointers;
//! - the root is a rectangle at the top (source rank).

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::rc::Rc;

use crate::predicate::PredicateStore;
use crate::region::{Region, RegionManager};
use crate::state::AnalysisState;

/// Named queries a host may pose against the current state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Query {
    /// Text rendering of the fact formula.
    Values,
    /// The set of tracked variable names.
    VarSet,
    /// The number of tracked variables.
    VarSetSize,
}

/// Style options for DOT output.
#[derive(Debug, Clone)]
pub struct DotConfig {
    pub node_shape: &'static str,
    pub terminal_shape: &'static str,
    pub root_shape: &'static str,
    pub high_edge_style: &'static str,
    pub low_edge_style: &'static str,
    pub negated_edge_style: &'static str,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "circle",
            terminal_shape: "square",
            root_shape: "rect",
            high_edge_style: "solid",
            low_edge_style: "dashed",
            negated_edge_style: "dotted",
        }
    }
}

/// Renders analysis states for diagnostics and host queries.
pub struct StateDumper<'a> {
    regions: Rc<RegionManager>,
    predicates: &'a PredicateStore,
}

impl<'a> StateDumper<'a> {
    pub fn new(regions: Rc<RegionManager>, predicates: &'a PredicateStore) -> Self {
        Self { regions, predicates }
    }

    /// Answer a named host query as a string.
    pub fn answer(&self, query: Query, state: &AnalysisState) -> String {
        match query {
            Query::Values => self.to_text(state),
            Query::VarSet => {
                let names: Vec<String> = self
                    .predicates
                    .tracked_names()
                    .iter()
                    .map(|name| name.to_string())
                    .collect();
                format!("[{}]", names.join(", "))
            }
            Query::VarSetSize => self.predicates.num_tracked().to_string(),
        }
    }

    /// Bracketed text rendering of the fact formula.
    pub fn to_text(&self, state: &AnalysisState) -> String {
        self.regions.to_bracket_string(state.fact())
    }

    /// Maps each region variable id to the `name/bit` label of its predicate.
    fn variable_labels(&self) -> HashMap<u32, String> {
        let mut labels = HashMap::new();
        for name in self.predicates.tracked_names() {
            if let Some(binding) = self.predicates.lookup(&name) {
                for (i, bit) in binding.iter().enumerate() {
                    let var = self.regions.variable(bit.index());
                    labels.insert(var, format!("{}/{}", name, i));
                }
            }
        }
        labels
    }

    fn label(&self, labels: &HashMap<u32, String>, var: u32) -> String {
        match labels.get(&var) {
            Some(name) => format!("\"{}\"", name),
            None => format!("\"x{}\"", var),
        }
    }

    /// DOT (Graphviz) rendering of the fact region.
    pub fn to_dot(&self, state: &AnalysisState) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(state, &DotConfig::default())
    }

    pub fn to_dot_with_config(
        &self,
        state: &AnalysisState,
        config: &DotConfig,
    ) -> Result<String, std::fmt::Error> {
        let root = state.fact();
        let labels = self.variable_labels();

        let mut dot = String::new();
        writeln!(dot, "graph {{")?;
        writeln!(dot, "node [shape={}, fixedsize=true];", config.node_shape)?;

        writeln!(dot, "{{ rank=sink")?;
        writeln!(dot, "0 [shape={}, label=\"0\"];", config.terminal_shape)?;
        writeln!(dot, "1 [shape={}, label=\"1\"];", config.terminal_shape)?;
        writeln!(dot, "}}")?;

        let all_nodes = self.regions.descendants([root]);

        // Group nodes by variable level so equal levels share a rank.
        let mut levels = BTreeMap::<u32, Vec<u32>>::new();
        for &id in all_nodes.iter() {
            if id == 1 {
                continue;
            }
            levels.entry(self.regions.variable(id)).or_default().push(id);
        }

        for level in levels.values() {
            writeln!(dot, "{{ rank=same")?;
            for &id in level.iter() {
                let var = self.regions.variable(id);
                writeln!(dot, "{} [label={}];", id, self.label(&labels, var))?;
            }
            writeln!(dot, "}}")?;
        }

        for &id in all_nodes.iter() {
            if id == 1 {
                continue;
            }

            let high = self.regions.high(id);
            assert!(!high.is_negated(), "High edges are never negated");
            writeln!(dot, "{} -- {} [style={}];", id, high.index(), config.high_edge_style)?;

            let low = self.regions.low(id);
            if low.is_negated() {
                if low.index() == 1 {
                    writeln!(dot, "{} -- 0 [style={}];", id, config.low_edge_style)?;
                } else {
                    writeln!(
                        dot,
                        "{} -- {} [style={}, dir=forward, arrowhead=odot];",
                        id,
                        low.index(),
                        config.negated_edge_style
                    )?;
                }
            } else {
                writeln!(dot, "{} -- {} [style={}];", id, low.index(), config.low_edge_style)?;
            }
        }

        writeln!(dot, "{{ rank=source")?;
        writeln!(dot, "r [shape={}, label=\"{}\"];", config.root_shape, root)?;
        writeln!(dot, "}}")?;
        self.write_root_edge(&mut dot, root)?;

        writeln!(dot, "}}")?;
        Ok(dot)
    }

    fn write_root_edge(&self, dot: &mut String, root: Region) -> std::fmt::Result {
        if root.is_negated() {
            if root.index() == 1 {
                writeln!(dot, "r -- 0;")
            } else {
                writeln!(dot, "r -- {} [dir=forward, arrowhead=odot];", root.index())
            }
        } else {
            writeln!(dot, "r -- {};", root.index())
        }
    }
}
