use crate::core::contract::ContractType;
use crate::core::ids::InstitutionId;
use crate::engine::Model;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

/// Directed graph of interbank funding: an edge runs from lender to
/// borrower, weighted by the outstanding principal of every loan and repo
/// between the two.
///
/// Funding contagion travels along these edges in both directions: a
/// lender pulling funding drains its borrowers, a defaulting borrower
/// inflicts losses on its lenders.
///
/// # Examples
///
/// ```
/// use contagion_engine::prelude::*;
///
/// let mut model = Model::new(Parameters::default());
/// let a = model.add_bank("A", BankProfile::default());
/// let b = model.add_bank("B", BankProfile::default());
/// for id in [a, b] {
///     model.add_other_asset(id, 10.0).unwrap();
///     model.add_other_liability(id, 10.0).unwrap();
/// }
/// model.add_interbank_loan(a, b, 4.0).unwrap();
/// model.add_interbank_loan(b, a, 1.0).unwrap();
///
/// let graph = ExposureGraph::from_model(&model);
/// assert_eq!(graph.exposure(a, b), 4.0);
/// assert_eq!(graph.contagion_components(), vec![vec![a, b]]);
/// ```
#[derive(Debug, Clone)]
pub struct ExposureGraph {
    graph: DiGraph<InstitutionId, f64>,
}

impl ExposureGraph {
    /// Build the graph from every interbank loan and repo with a positive
    /// principal. Node `i` is institution `i`.
    pub fn from_model(model: &Model) -> Self {
        let mut graph = DiGraph::with_capacity(model.population(), 0);
        for id in model.ids() {
            graph.add_node(id);
        }
        for (_, contract) in model.contracts().iter() {
            if !matches!(contract.contract_type(), ContractType::Loan | ContractType::Repo) {
                continue;
            }
            let (Some(lender), Some(borrower)) = (contract.asset_party(), contract.liability_party()) else {
                continue;
            };
            let principal = contract.valuation();
            if principal <= 0.0 {
                continue;
            }
            let (from, to) = (node(lender), node(borrower));
            match graph.find_edge(from, to) {
                Some(edge) => graph[edge] += principal,
                None => {
                    graph.add_edge(from, to, principal);
                }
            }
        }
        Self { graph }
    }

    pub fn graph(&self) -> &DiGraph<InstitutionId, f64> {
        &self.graph
    }

    pub fn institution_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of lender/borrower pairs.
    pub fn exposure_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outstanding principal `lender` has lent to `borrower`.
    pub fn exposure(&self, lender: InstitutionId, borrower: InstitutionId) -> f64 {
        if lender.index() >= self.graph.node_count() || borrower.index() >= self.graph.node_count() {
            return 0.0;
        }
        self.graph
            .find_edge(node(lender), node(borrower))
            .map_or(0.0, |e| self.graph[e])
    }

    /// Sum of all interbank exposures.
    pub fn total_exposure(&self) -> f64 {
        self.graph.edge_weights().sum()
    }

    /// Who `id` has lent to, with amounts.
    pub fn borrowers_of(&self, id: InstitutionId) -> Vec<(InstitutionId, f64)> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Who `id` has borrowed from, with amounts.
    pub fn lenders_to(&self, id: InstitutionId) -> Vec<(InstitutionId, f64)> {
        self.neighbours(id, Direction::Incoming)
    }

    fn neighbours(&self, id: InstitutionId, direction: Direction) -> Vec<(InstitutionId, f64)> {
        if id.index() >= self.graph.node_count() {
            return Vec::new();
        }
        let mut out: Vec<(InstitutionId, f64)> = self
            .graph
            .edges_directed(node(id), direction)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (self.graph[other], *e.weight())
            })
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Groups of institutions that can all reach each other through
    /// funding links, so a shock to any one of them can come back around.
    ///
    /// Uses Tarjan's algorithm. Singletons are dropped; each component is
    /// sorted and the list is ordered by its first member.
    pub fn contagion_components(&self) -> Vec<Vec<InstitutionId>> {
        let mut components: Vec<Vec<InstitutionId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|c| c.len() > 1)
            .map(|c| {
                let mut ids: Vec<InstitutionId> = c.into_iter().map(|n| self.graph[n]).collect();
                ids.sort();
                ids
            })
            .collect();
        components.sort();
        components
    }
}

fn node(id: InstitutionId) -> NodeIndex {
    NodeIndex::new(id.index())
}
