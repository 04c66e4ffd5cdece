//! JSON serialization of the surviving link set.
//!
//! Each link serializes as a pair of occurrence tuples
//! `[[center, strand, genome, sequence, span], [...]]`, with the center
//! position (not the first base) and resolved names.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::idmap::IdentifierMapping;
use crate::links::Link;
use crate::occurrence::OccurrenceRecord;

fn occurrence_value(occ: OccurrenceRecord, span: u32, idmap: &IdentifierMapping) -> Value {
    json!([
        occ.center(span as usize),
        u8::from(occ.is_reverse()),
        idmap.genome_name(occ.genome()),
        idmap.sequence_name(occ.sequence()),
        span,
    ])
}

pub fn links_to_json(links: &[Link], idmap: &IdentifierMapping) -> Value {
    Value::Array(
        links
            .iter()
            .map(|l| {
                json!([
                    occurrence_value(l.first(), l.span(), idmap),
                    occurrence_value(l.second(), l.span(), idmap),
                ])
            })
            .collect(),
    )
}

pub fn write_links(path: &Path, links: &[Link], idmap: &IdentifierMapping) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {:?}", path))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer(&mut w, &links_to_json(links, idmap))
        .with_context(|| format!("write {:?}", path))?;
    w.flush().with_context(|| format!("flush {:?}", path))?;
    Ok(())
}
