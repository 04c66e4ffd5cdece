//! Genome and sequence name registries.
//!
//! Genomes and sequences get dense integer ids in registration order;
//! genomes 0 and 1 are always the two primary compared genomes. Sequence ids
//! are global across genomes, as required by the packed occurrence layout.

use hashbrown::HashMap;

use crate::occurrence::{CapacityExceeded, OccurrenceRecord};

#[derive(Default)]
pub struct IdentifierMapping {
    genome_names: Vec<String>,
    genome_ids: HashMap<String, u8>,
    sequence_names: Vec<String>,
    sequence_genomes: Vec<u8>,
    sequence_ids: HashMap<(u8, String), u32>,
}

impl IdentifierMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a genome name, or return its existing id.
    pub fn register_genome(&mut self, name: &str) -> Result<u8, CapacityExceeded> {
        if let Some(&id) = self.genome_ids.get(name) {
            return Ok(id);
        }
        let next = self.genome_names.len() as u64;
        if next > OccurrenceRecord::MAX_GENOME {
            return Err(CapacityExceeded {
                field: "genome",
                value: next,
                max: OccurrenceRecord::MAX_GENOME,
            });
        }
        let id = next as u8;
        self.genome_names.push(name.to_string());
        self.genome_ids.insert(name.to_string(), id);
        Ok(id)
    }

    /// Register a sequence name within a genome, or return its existing id.
    pub fn register_sequence(&mut self, name: &str, genome: u8) -> Result<u32, CapacityExceeded> {
        if let Some(&id) = self.sequence_ids.get(&(genome, name.to_string())) {
            return Ok(id);
        }
        let next = self.sequence_names.len() as u64;
        if next > OccurrenceRecord::MAX_SEQUENCE {
            return Err(CapacityExceeded {
                field: "sequence",
                value: next,
                max: OccurrenceRecord::MAX_SEQUENCE,
            });
        }
        let id = next as u32;
        self.sequence_names.push(name.to_string());
        self.sequence_genomes.push(genome);
        self.sequence_ids.insert((genome, name.to_string()), id);
        Ok(id)
    }

    pub fn query_genome_id(&self, name: &str) -> Option<u8> {
        self.genome_ids.get(name).copied()
    }

    pub fn query_sequence_id(&self, name: &str, genome: u8) -> Option<u32> {
        self.sequence_ids.get(&(genome, name.to_string())).copied()
    }

    pub fn genome_name(&self, id: u8) -> &str {
        &self.genome_names[id as usize]
    }

    pub fn sequence_name(&self, id: u32) -> &str {
        &self.sequence_names[id as usize]
    }

    pub fn genome_of_sequence(&self, id: u32) -> u8 {
        self.sequence_genomes[id as usize]
    }

    pub fn genome_count(&self) -> usize {
        self.genome_names.len()
    }

    pub fn sequence_count(&self) -> usize {
        self.sequence_names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        let mut m = IdentifierMapping::new();
        let g0 = m.register_genome("human").unwrap();
        let g1 = m.register_genome("mouse").unwrap();
        assert_eq!((g0, g1), (0, 1));
        assert_eq!(m.register_genome("human").unwrap(), 0);

        let s0 = m.register_sequence("chr1", g0).unwrap();
        let s1 = m.register_sequence("chr1", g1).unwrap();
        assert_eq!((s0, s1), (0, 1));
        assert_eq!(m.register_sequence("chr1", g0).unwrap(), 0);

        assert_eq!(m.query_genome_id("mouse"), Some(1));
        assert_eq!(m.query_genome_id("yeast"), None);
        assert_eq!(m.query_sequence_id("chr1", g1), Some(1));
        assert_eq!(m.query_sequence_id("chr2", g1), None);
        assert_eq!(m.genome_name(1), "mouse");
        assert_eq!(m.sequence_name(1), "chr1");
        assert_eq!(m.genome_of_sequence(1), 1);
    }

    #[test]
    fn genome_budget_is_enforced() {
        let mut m = IdentifierMapping::new();
        for i in 0..16 {
            m.register_genome(&format!("g{i}")).unwrap();
        }
        let err = m.register_genome("g16").unwrap_err();
        assert_eq!(err.field, "genome");
    }
}
