//! FASTA input: one file per genome, plain or gzip-compressed.

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use seq_io::fasta::{Reader as FastaReader, Record};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::idmap::IdentifierMapping;

/// One input sequence, ready for seed extraction.
pub struct SequenceRecord {
    pub genome: u8,
    pub sequence: u32,
    pub data: Vec<u8>,
}

/// Derive the genome name from the file name: strip `.gz`, then a FASTA
/// extension (case-insensitive).
pub fn genome_name_from_path(p: &Path) -> String {
    let mut stem = p
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("unnamed")
        .to_string();
    if stem.ends_with(".gz") {
        stem.truncate(stem.len() - 3);
    }
    for ext in [".fa", ".fasta", ".fas", ".fna"] {
        if stem.to_ascii_lowercase().ends_with(ext) {
            let n = stem.len() - ext.len();
            stem.truncate(n);
            break;
        }
    }
    stem
}

pub(crate) fn open_fasta(path: &Path) -> Result<Box<dyn Read>> {
    let f = File::open(path).with_context(|| format!("open {:?}", path))?;
    let r: Box<dyn Read> = if path.to_str().is_some_and(|s| s.ends_with(".gz")) {
        Box::new(MultiGzDecoder::new(f))
    } else {
        Box::new(f)
    };
    Ok(r)
}

/// Read one genome file and register its name and sequence names.
/// File order across calls determines genome ids, so genomes 0 and 1 are the
/// first two files given.
pub fn load_genome(
    path: &Path,
    idmap: &mut IdentifierMapping,
    out: &mut Vec<SequenceRecord>,
) -> Result<u8> {
    let genome = idmap.register_genome(&genome_name_from_path(path))?;
    let mut reader = FastaReader::new(open_fasta(path)?);
    while let Some(rec) = reader.next() {
        let rec = rec.with_context(|| format!("parse {:?}", path))?;
        let name = rec
            .id()
            .with_context(|| format!("sequence name in {:?} is not valid UTF-8", path))?
            .to_string();
        let sequence = idmap.register_sequence(&name, genome)?;
        out.push(SequenceRecord {
            genome,
            sequence,
            data: rec.full_seq().into_owned(),
        });
    }
    Ok(genome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn genome_names_strip_extensions() {
        assert_eq!(genome_name_from_path(Path::new("dm6.fa")), "dm6");
        assert_eq!(genome_name_from_path(Path::new("a/b/hg38.fasta.gz")), "hg38");
        assert_eq!(genome_name_from_path(Path::new("x.fna")), "x");
        assert_eq!(genome_name_from_path(Path::new("plain")), "plain");
    }

    #[test]
    fn loads_multiline_fasta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toy.fa");
        let mut f = File::create(&path).unwrap();
        writeln!(f, ">chr1 some description").unwrap();
        writeln!(f, "ACGTACGT").unwrap();
        writeln!(f, "TTTT").unwrap();
        writeln!(f, ">chr2").unwrap();
        writeln!(f, "GGGG").unwrap();
        drop(f);

        let mut idmap = IdentifierMapping::new();
        let mut records = Vec::new();
        let genome = load_genome(&path, &mut idmap, &mut records).unwrap();
        assert_eq!(genome, 0);
        assert_eq!(idmap.genome_name(0), "toy");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].data, b"ACGTACGTTTTT");
        assert_eq!(idmap.sequence_name(records[0].sequence), "chr1");
        assert_eq!(records[1].data, b"GGGG");
        assert_eq!(idmap.sequence_name(records[1].sequence), "chr2");
    }
}
