//! Dump command implementation

use anyhow::{Context, Result};
use quill_index::{SegmentInfos, read::SegmentReader};
use quill_io::FsDirectory;

/// Run the dump command
pub fn run(index: String, segment: Option<String>, docs: bool) -> Result<()> {
    let directory =
        FsDirectory::open(&index).with_context(|| format!("Failed to open {index}"))?;
    let infos = SegmentInfos::load(&directory)?;
    anyhow::ensure!(!infos.segments.is_empty(), "no segments in {index}");

    let selected: Vec<_> = infos
        .segments
        .iter()
        .filter(|info| segment.as_ref().is_none_or(|name| &info.name == name))
        .collect();
    if let Some(name) = &segment {
        anyhow::ensure!(!selected.is_empty(), "segment {name} not found in {index}");
    }

    for info in selected {
        let reader = SegmentReader::open(&directory, info)
            .with_context(|| format!("Failed to open segment {}", info.name))?;
        print_segment(&reader, docs)?;
    }
    Ok(())
}

fn print_segment(reader: &SegmentReader, docs: bool) -> Result<()> {
    let info = reader.info();
    println!("Segment {}", info.name);
    println!(
        "  docs: {} ({} deleted), term vectors: {}",
        info.doc_count, info.del_count, info.has_vectors
    );

    println!("  fields:");
    for field in reader.field_infos().iter() {
        let mut flags = Vec::new();
        if field.is_indexed {
            flags.push("indexed");
        }
        if field.store_term_vector {
            flags.push("vectors");
        }
        if field.omit_norms {
            flags.push("omit_norms");
        }
        if field.store_payloads {
            flags.push("payloads");
        }
        println!("    {} {} [{}]", field.number, field.name, flags.join(", "));
    }

    println!("  terms: {}", reader.num_terms());
    for term in reader.terms()? {
        let term = term?;
        let field = reader
            .field_infos()
            .get(term.field)
            .map_or("?", |field| field.name.as_str());
        println!(
            "    {field}:{} df={}",
            String::from_utf16_lossy(&term.text),
            term.info.doc_freq
        );
    }

    if docs {
        println!("  documents:");
        for doc in 0..reader.max_doc() {
            let marker = if reader.is_deleted(doc) { " (deleted)" } else { "" };
            println!("    {doc}{marker}");
            for field in reader.document(doc)? {
                println!("      {} = {:?}", field.name, field.value);
            }
        }
    }
    Ok(())
}
