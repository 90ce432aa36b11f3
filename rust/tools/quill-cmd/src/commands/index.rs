//! Index command implementation

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use anyhow::{Context, Result};
use quill_index::{Document, Field, IndexWriter, IndexWriterConfig};
use quill_io::{Directory, FsDirectory};

use crate::utils;

/// Run the index command
pub fn run(
    input: String,
    output: String,
    ram_mb: Option<f64>,
    threads: usize,
    config_path: Option<String>,
) -> Result<()> {
    anyhow::ensure!(threads > 0, "--threads must be at least 1");
    let mut config = match config_path {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {path}"))?;
            IndexWriterConfig::from_json(&json)?
        }
        None => IndexWriterConfig::new(),
    };
    if let Some(mb) = ram_mb {
        config = config.with_ram_buffer_size_mb(mb);
    }

    let mut files = Vec::new();
    collect_files(Path::new(&input), &mut files)
        .with_context(|| format!("Failed to list {input}"))?;
    files.sort();
    println!("Indexing {} files from {input} into {output}", files.len());

    let directory = Arc::new(
        FsDirectory::open(&output).with_context(|| format!("Failed to open {output}"))?,
    );
    let writer = IndexWriter::new(directory.clone(), config)?;
    let started = Instant::now();
    let next = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);

    std::thread::scope(|scope| -> Result<()> {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(|| -> Result<()> {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(path) = files.get(i) else {
                            return Ok(());
                        };
                        let Ok(body) = std::fs::read_to_string(path) else {
                            log::warn!("skipping {}: not readable as UTF-8", path.display());
                            skipped.fetch_add(1, Ordering::Relaxed);
                            continue;
                        };
                        let doc = Document::new()
                            .with_field(Field::keyword("path", path.display().to_string()))
                            .with_field(Field::text("body", body));
                        writer.add_document(doc)?;
                    }
                })
            })
            .collect();
        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("indexing thread panicked"))??;
        }
        Ok(())
    })?;
    writer.close()?;

    let segments = writer.segments();
    let index_bytes: u64 = directory
        .list_all()?
        .iter()
        .filter_map(|name| directory.file_length(name).ok())
        .sum();
    println!(
        "Indexed {} documents ({} skipped) in {:.2?}",
        files.len() - skipped.load(Ordering::Relaxed),
        skipped.load(Ordering::Relaxed),
        started.elapsed()
    );
    println!(
        "Index holds {} segments, {} live documents, {}",
        segments.len(),
        writer.num_docs(),
        utils::format_size(index_bytes)
    );
    if writer.skipped_terms() > 0 {
        println!("Skipped {} oversized terms", writer.skipped_terms());
    }
    Ok(())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use quill_index::{SegmentInfos, read::SegmentReader};

    use super::*;

    #[test]
    fn test_index_directory() {
        let input = tempfile::TempDir::new().unwrap();
        let output = tempfile::TempDir::new().unwrap();
        std::fs::write(input.path().join("a.txt"), "red fish blue fish").unwrap();
        std::fs::create_dir(input.path().join("nested")).unwrap();
        std::fs::write(input.path().join("nested").join("b.txt"), "one fish").unwrap();

        run(
            input.path().display().to_string(),
            output.path().display().to_string(),
            None,
            2,
            None,
        )
        .unwrap();

        let dir = FsDirectory::open(output.path()).unwrap();
        let infos = SegmentInfos::load(&dir).unwrap();
        assert_eq!(infos.segments.len(), 1);
        let reader = SegmentReader::open(&dir, &infos.segments[0]).unwrap();
        assert_eq!(reader.num_docs(), 2);
        assert_eq!(reader.doc_freq("body", "fish").unwrap(), 2);
        assert_eq!(reader.doc_freq("body", "blue").unwrap(), 1);
    }
}
