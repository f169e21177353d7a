use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::organisms::components::{DeathCause, PredatorSubtype, Species};
use crate::organisms::genetics::{Genome, GenomeId};

/// One genome in the lineage tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneticTreeNode {
    pub genome_id: GenomeId,
    pub parent_id: Option<GenomeId>,
    pub children: Vec<GenomeId>,
    pub species: Species,
    pub subtype: Option<PredatorSubtype>,
    pub color: [f32; 3],
    pub generation: u32,
    pub birth_tick: u64,
    pub death_tick: Option<u64>,
    pub death_cause: Option<DeathCause>,
}

/// Append-only lineage registry keyed by genome id.
///
/// Nodes are never removed. After creation a node only changes to record its
/// death (once) or to append a child link.
#[derive(Debug, Clone, Default)]
pub struct GeneticTree {
    nodes: HashMap<GenomeId, GeneticTreeNode>,
    /// Founders in registration order
    roots: Vec<GenomeId>,
}

impl GeneticTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node for `genome`. Genomes whose parent is unknown become roots.
    pub fn register(&mut self, genome: &Genome, birth_tick: u64) {
        if self.nodes.contains_key(&genome.id) {
            return;
        }
        let parent = genome.parent_id.filter(|id| self.nodes.contains_key(id));
        match parent.and_then(|id| self.nodes.get_mut(&id)) {
            Some(parent_node) => parent_node.children.push(genome.id),
            None => self.roots.push(genome.id),
        }
        self.nodes.insert(
            genome.id,
            GeneticTreeNode {
                genome_id: genome.id,
                parent_id: genome.parent_id,
                children: Vec::new(),
                species: genome.species(),
                subtype: genome.subtype(),
                color: genome.color,
                generation: genome.generation,
                birth_tick,
                death_tick: None,
                death_cause: None,
            },
        );
    }

    /// Records the death of `id`. Returns false if unknown or already dead.
    pub fn record_death(&mut self, id: GenomeId, tick: u64, cause: DeathCause) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.death_tick.is_none() => {
                node.death_tick = Some(tick);
                node.death_cause = Some(cause);
                true
            }
            _ => false,
        }
    }

    pub fn node(&self, id: GenomeId) -> Option<&GeneticTreeNode> {
        self.nodes.get(&id)
    }

    pub fn roots(&self) -> Vec<GeneticTreeNode> {
        self.roots
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneticsConfig;
    use crate::organisms::genetics::GenomeFactory;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn children_link_to_parents_and_death_is_set_once() {
        let config = GeneticsConfig::default();
        let mut factory = GenomeFactory::new();
        let mut rng = StdRng::seed_from_u64(8);
        let founder = factory.create_base(&mut rng, &config, Species::Prey, None);
        let child = factory.mutate(&mut rng, &config, &founder, 0.1);

        let mut tree = GeneticTree::new();
        tree.register(&founder, 0);
        tree.register(&child, 40);

        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.node(founder.id).unwrap().children, vec![child.id]);
        assert_eq!(tree.node(child.id).unwrap().generation, 1);

        assert!(tree.record_death(child.id, 90, DeathCause::Predation));
        assert!(!tree.record_death(child.id, 95, DeathCause::OldAge));
        let node = tree.node(child.id).unwrap();
        assert_eq!(node.death_tick, Some(90));
        assert_eq!(node.death_cause, Some(DeathCause::Predation));
    }
}
