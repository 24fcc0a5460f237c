//! Forward/reverse adjacency, cycle detection and blocked-status propagation.

use super::references::extract_references;
use crate::models::{Card, CardId};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Map every provider to the cards that consume it.
///
/// Every card id observed (as consumer or provider) is a key, possibly with
/// an empty list, so lookups never need existence checks.
pub fn build_reverse_graph(cards: &[Card]) -> BTreeMap<CardId, Vec<CardId>> {
    DependencyGraph::build(cards).reverse
}

/// Dependency graph over a set of cards.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// consumer -> providers
    forward: BTreeMap<CardId, BTreeSet<CardId>>,
    /// provider -> consumers
    reverse: BTreeMap<CardId, Vec<CardId>>,
}

impl DependencyGraph {
    pub fn build(cards: &[Card]) -> Self {
        Self::from_edges(cards.iter().map(|card| {
            let providers = extract_references(&card.query_body);
            (card.id, providers)
        }))
    }

    /// Build from `(consumer, providers)` pairs.
    pub fn from_edges(edges: impl IntoIterator<Item = (CardId, BTreeSet<CardId>)>) -> Self {
        let mut graph = Self::default();

        for (consumer, providers) in edges {
            graph.reverse.entry(consumer).or_default();
            for &provider in &providers {
                graph.forward.entry(provider).or_default();
                let consumers = graph.reverse.entry(provider).or_default();
                if !consumers.contains(&consumer) {
                    consumers.push(consumer);
                }
            }
            graph.forward.entry(consumer).or_default().extend(providers);
        }

        graph
    }

    /// Every card id in the graph, ascending.
    pub fn nodes(&self) -> impl Iterator<Item = CardId> + '_ {
        self.forward.keys().copied()
    }

    pub fn contains(&self, id: CardId) -> bool {
        self.forward.contains_key(&id)
    }

    /// Cards `id` reads from.
    pub fn dependencies(&self, id: CardId) -> impl Iterator<Item = CardId> + '_ {
        self.forward.get(&id).into_iter().flatten().copied()
    }

    /// Cards that read from `id`.
    pub fn dependents(&self, id: CardId) -> &[CardId] {
        self.reverse.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Strongly connected components that form cycles, including self-loops.
    ///
    /// Each cycle is sorted ascending; cycles are ordered by their smallest id.
    pub fn find_cycles(&self) -> Vec<Vec<CardId>> {
        let mut tarjan = Tarjan::new(self);
        for id in self.nodes() {
            if !tarjan.index.contains_key(&id) {
                tarjan.visit(id);
            }
        }

        let mut cycles: Vec<Vec<CardId>> = tarjan
            .components
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&id| self.dependencies(id).any(|dep| dep == id))
            })
            .map(|mut component| {
                component.sort_unstable();
                component
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Cards that cannot move yet.
    ///
    /// Seeds are the unmigrated cards that need dialect translation; they are
    /// blocked themselves. Blockage then flows breadth-first to every
    /// unmigrated consumer. Migrated cards stop the propagation.
    pub fn blocked_cards(
        &self,
        is_migrated: impl Fn(CardId) -> bool,
        needs_translation: impl Fn(CardId) -> bool,
    ) -> BTreeSet<CardId> {
        let mut blocked = BTreeSet::new();
        let mut queue = VecDeque::new();

        for id in self.nodes() {
            if !is_migrated(id) && needs_translation(id) && blocked.insert(id) {
                queue.push_back(id);
            }
        }

        while let Some(id) = queue.pop_front() {
            for &consumer in self.dependents(id) {
                if is_migrated(consumer) {
                    continue;
                }
                if blocked.insert(consumer) {
                    queue.push_back(consumer);
                }
            }
        }

        blocked
    }

    /// Providers-first order of every card outside a cycle.
    ///
    /// Cards that sit on, or depend on, a cycle are left out.
    pub fn migration_order(&self) -> Vec<CardId> {
        let mut pending: BTreeMap<CardId, usize> = self
            .forward
            .iter()
            .map(|(&id, deps)| (id, deps.len()))
            .collect();
        let mut ready: BTreeSet<CardId> = pending
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(pending.len());

        while let Some(id) = ready.pop_first() {
            pending.remove(&id);
            order.push(id);
            for &consumer in self.dependents(id) {
                if let Some(count) = pending.get_mut(&consumer) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(consumer);
                    }
                }
            }
        }

        order
    }
}

/// Recursive Tarjan SCC state.
struct Tarjan<'a> {
    graph: &'a DependencyGraph,
    next_index: usize,
    index: BTreeMap<CardId, usize>,
    lowlink: BTreeMap<CardId, usize>,
    stack: Vec<CardId>,
    on_stack: BTreeSet<CardId>,
    components: Vec<Vec<CardId>>,
}

impl<'a> Tarjan<'a> {
    fn new(graph: &'a DependencyGraph) -> Self {
        Self {
            graph,
            next_index: 0,
            index: BTreeMap::new(),
            lowlink: BTreeMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, id: CardId) {
        self.index.insert(id, self.next_index);
        self.lowlink.insert(id, self.next_index);
        self.next_index += 1;
        self.stack.push(id);
        self.on_stack.insert(id);

        let deps: Vec<CardId> = self.graph.dependencies(id).collect();
        for dep in deps {
            if !self.index.contains_key(&dep) {
                self.visit(dep);
                let low = self.lowlink[&id].min(self.lowlink[&dep]);
                self.lowlink.insert(id, low);
            } else if self.on_stack.contains(&dep) {
                let low = self.lowlink[&id].min(self.index[&dep]);
                self.lowlink.insert(id, low);
            }
        }

        if self.lowlink[&id] == self.index[&id] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(&member);
                component.push(member);
                if member == id {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(CardId, &[CardId])]) -> DependencyGraph {
        DependencyGraph::from_edges(
            edges
                .iter()
                .map(|(consumer, providers)| (*consumer, providers.iter().copied().collect())),
        )
    }

    #[test]
    fn test_reverse_graph_has_every_node() {
        let g = graph(&[(100, &[99]), (101, &[99, 100])]);
        assert_eq!(g.dependents(99), &[100, 101]);
        assert_eq!(g.dependents(100), &[101]);
        assert!(g.dependents(101).is_empty());
        assert!(g.contains(99));
    }

    #[test]
    fn test_build_reverse_graph_from_cards() {
        use crate::models::QueryKind;
        use serde_json::json;

        let card = |id: CardId, body| Card {
            id,
            name: String::new(),
            query_kind: QueryKind::Structured,
            query_body: body,
            source_system_id: 1,
            description: None,
            collection_id: None,
            display: "table".into(),
            visualization_settings: json!({}),
        };
        let cards = vec![
            card(99, json!({"source-table": 10})),
            card(100, json!({"source-table": "embedded-card:99"})),
            card(101, json!({"source-table": "embedded-card:98"})),
        ];

        let reverse = build_reverse_graph(&cards);
        assert_eq!(reverse[&99], vec![100]);
        assert_eq!(reverse[&98], vec![101]);
        assert!(reverse[&100].is_empty());
        assert!(reverse[&101].is_empty());
    }

    #[test]
    fn test_find_cycles() {
        let g = graph(&[(1, &[2]), (2, &[3]), (3, &[1]), (4, &[4]), (5, &[1])]);
        assert_eq!(g.find_cycles(), vec![vec![1, 2, 3], vec![4]]);
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let g = graph(&[(1, &[2, 3]), (2, &[3]), (3, &[])]);
        assert!(g.find_cycles().is_empty());
    }

    #[test]
    fn test_migration_order_providers_first() {
        let g = graph(&[(1, &[2, 3]), (2, &[3]), (3, &[]), (7, &[8]), (8, &[7])]);
        assert_eq!(g.migration_order(), vec![3, 2, 1]);
    }

    #[test]
    fn test_blocked_propagation_stops_at_migrated() {
        // 99 (raw) <- 100 <- 101, and 50 (raw, migrated) <- 51
        let g = graph(&[(100, &[99]), (101, &[100]), (51, &[50])]);
        let migrated = BTreeSet::from([50]);
        let raw = BTreeSet::from([99, 50]);

        let blocked = g.blocked_cards(|id| migrated.contains(&id), |id| raw.contains(&id));
        assert_eq!(blocked, BTreeSet::from([99, 100, 101]));
    }

    #[test]
    fn test_migrated_consumer_does_not_propagate() {
        // 99 (raw) <- 100 (migrated) <- 101
        let g = graph(&[(100, &[99]), (101, &[100])]);
        let blocked = g.blocked_cards(|id| id == 100, |id| id == 99);
        assert_eq!(blocked, BTreeSet::from([99]));
    }
}
