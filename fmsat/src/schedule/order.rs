//! Ordering policies for buffered configurations.
use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::configuration::BuilderConfiguration;

/// How the scheduler picks the next configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderingPolicy {
    /// First in, first out.
    Insertion,
    /// Prefer configurations that differ most from the ones already handed out.
    Difference,
    /// Prefer configurations covering the most feature interactions not covered yet.
    Interaction { strength: usize },
}

/// A t-wise combination of feature literals, as sorted literal codes.
type Interaction = SmallVec<[u32; 4]>;

/// Buffer of configurations that hands them out in policy order.
///
/// The policy is consulted for every pick. [`Sorter::sort`] fixes the order of everything
/// currently buffered in one pass.
pub struct Sorter {
    policy: OrderingPolicy,
    /// Feature names that take part in interactions, usually the concrete features.
    universe: Vec<String>,
    positions: FxHashMap<String, usize>,
    buffer: VecDeque<BuilderConfiguration>,
    sorted: VecDeque<BuilderConfiguration>,
    handed_out: Vec<BuilderConfiguration>,
    covered: FxHashSet<Interaction>,
}

impl Sorter {
    pub fn new(policy: OrderingPolicy, universe: Vec<String>) -> Sorter {
        let positions = universe
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), index))
            .collect();
        Sorter {
            policy,
            universe,
            positions,
            buffer: VecDeque::new(),
            sorted: VecDeque::new(),
            handed_out: vec![],
            covered: FxHashSet::default(),
        }
    }

    pub fn policy(&self) -> OrderingPolicy {
        self.policy
    }

    pub fn add(&mut self, configuration: BuilderConfiguration) {
        self.buffer.push_back(configuration);
    }

    /// Number of buffered configurations.
    pub fn len(&self) -> usize {
        self.buffer.len() + self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the next configuration according to the policy.
    pub fn pop(&mut self) -> Option<BuilderConfiguration> {
        if let Some(configuration) = self.sorted.pop_front() {
            return Some(configuration);
        }
        self.take_best()
    }

    /// Orders all buffered configurations. Returns the number of sorted configurations.
    pub fn sort(&mut self) -> usize {
        while let Some(configuration) = self.take_best() {
            self.sorted.push_back(configuration);
        }
        self.sorted.len()
    }

    fn take_best(&mut self) -> Option<BuilderConfiguration> {
        let index = self.best_index()?;
        let configuration = self.buffer.remove(index)?;
        self.record(&configuration);
        Some(configuration)
    }

    fn best_index(&self) -> Option<usize> {
        if self.buffer.is_empty() {
            return None;
        }
        if self.policy == OrderingPolicy::Insertion {
            return Some(0);
        }

        let mut best = 0;
        let mut best_score = None;
        for (index, candidate) in self.buffer.iter().enumerate() {
            let candidate_score = self.score(candidate);
            if best_score.map_or(true, |best_score| candidate_score > best_score) {
                best = index;
                best_score = Some(candidate_score);
            }
        }
        Some(best)
    }

    fn score(&self, candidate: &BuilderConfiguration) -> usize {
        match self.policy {
            OrderingPolicy::Insertion => 0,
            OrderingPolicy::Difference => self.min_distance(candidate),
            OrderingPolicy::Interaction { strength } => self.uncovered(candidate, strength),
        }
    }

    fn record(&mut self, configuration: &BuilderConfiguration) {
        match self.policy {
            OrderingPolicy::Insertion => (),
            OrderingPolicy::Difference => self.handed_out.push(configuration.clone()),
            OrderingPolicy::Interaction { strength } => {
                let mut interactions = vec![];
                self.for_each_interaction(configuration, strength, |interaction| {
                    interactions.push(interaction.clone())
                });
                self.covered.extend(interactions);
            }
        }
    }

    /// Smallest distance to a handed out configuration.
    ///
    /// Before anything was handed out, the number of selected features.
    fn min_distance(&self, candidate: &BuilderConfiguration) -> usize {
        self.handed_out
            .iter()
            .map(|previous| candidate.distance(previous))
            .min()
            .unwrap_or_else(|| candidate.len())
    }

    fn uncovered(&self, candidate: &BuilderConfiguration, strength: usize) -> usize {
        let mut count = 0;
        self.for_each_interaction(candidate, strength, |interaction| {
            if !self.covered.contains(interaction) {
                count += 1;
            }
        });
        count
    }

    /// Calls `action` for every combination of `strength` literals of the configuration.
    ///
    /// Each universe feature contributes its positive literal when selected and its negative
    /// literal otherwise. Features outside the universe are ignored.
    fn for_each_interaction(
        &self,
        configuration: &BuilderConfiguration,
        strength: usize,
        mut action: impl FnMut(&Interaction),
    ) {
        let mut literals: Vec<u32> = (0..self.universe.len())
            .map(|index| 2 * index as u32 + 1)
            .collect();
        for feature in configuration.features().iter() {
            if let Some(&index) = self.positions.get(feature) {
                literals[index] = 2 * index as u32;
            }
        }

        let strength = strength.min(literals.len());
        if strength == 0 {
            return;
        }

        let mut chosen: Vec<usize> = (0..strength).collect();
        let mut interaction = Interaction::new();
        loop {
            interaction.clear();
            interaction.extend(chosen.iter().map(|&index| literals[index]));
            action(&interaction);

            // Advance to the next combination in lexicographic order.
            let mut position = strength;
            loop {
                if position == 0 {
                    return;
                }
                position -= 1;
                if chosen[position] < literals.len() - strength + position {
                    break;
                }
            }
            chosen[position] += 1;
            for next in position + 1..strength {
                chosen[next] = chosen[next - 1] + 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configuration(id: u64, features: &[&str]) -> BuilderConfiguration {
        BuilderConfiguration::new(id, features.iter().cloned())
    }

    fn universe() -> Vec<String> {
        ["A", "B", "C", "D"].iter().map(|&name| name.to_owned()).collect()
    }

    fn drain(sorter: &mut Sorter) -> Vec<u64> {
        let mut ids = vec![];
        while let Some(configuration) = sorter.pop() {
            ids.push(configuration.id());
        }
        ids
    }

    #[test]
    fn insertion_order() {
        let mut sorter = Sorter::new(OrderingPolicy::Insertion, universe());
        for id in 1..=3 {
            sorter.add(configuration(id, &["A"]));
        }
        assert_eq!(sorter.len(), 3);
        assert_eq!(drain(&mut sorter), vec![1, 2, 3]);
        assert!(sorter.is_empty());
    }

    #[test]
    fn difference_order() {
        let mut sorter = Sorter::new(OrderingPolicy::Difference, universe());
        sorter.add(configuration(1, &["A"]));
        sorter.add(configuration(2, &["A", "B"]));
        sorter.add(configuration(3, &["A", "B", "C"]));
        sorter.add(configuration(4, &["D"]));

        // Largest first, then the one farthest from it, ties go to the earliest.
        assert_eq!(drain(&mut sorter), vec![3, 4, 1, 2]);
    }

    #[test]
    fn interaction_order() {
        let mut sorter = Sorter::new(OrderingPolicy::Interaction { strength: 2 }, universe());
        sorter.add(configuration(1, &["A", "B"]));
        sorter.add(configuration(2, &["A", "B"]));
        sorter.add(configuration(3, &["C", "D"]));
        sorter.add(configuration(4, &["A", "B", "C", "D"]));

        let count = sorter.sort();
        assert_eq!(count, 4);
        assert_eq!(drain(&mut sorter), vec![1, 3, 4, 2]);
    }

    #[test]
    fn interactions_of_strength() {
        let sorter = Sorter::new(OrderingPolicy::Interaction { strength: 3 }, universe());
        let mut seen = vec![];
        sorter.for_each_interaction(&configuration(1, &["B"]), 3, |interaction| {
            seen.push(interaction.to_vec())
        });

        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], vec![1, 2, 5]);
        assert_eq!(seen[3], vec![2, 5, 7]);
    }
}
