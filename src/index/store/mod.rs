
use arrow::array::{Array, FixedSizeListArray, Float32Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{IndexEntry, VectorIndex};
use crate::embeddings::Chunk;
use crate::{RagError, Result};

/// File holding the index inside the index directory
pub const INDEX_FILE: &str = "index.arrow";

/// Bumped whenever the column layout changes; files with another version are refused
pub const SCHEMA_VERSION: &str = "1";

const META_SCHEMA_VERSION: &str = "pdf_chat.schema_version";
const META_EMBEDDING_MODEL: &str = "pdf_chat.embedding_model";
const META_DIMENSION: &str = "pdf_chat.dimension";
const META_BUILT_AT: &str = "pdf_chat.built_at";

/// Write `index` to `location/index.arrow`.
///
/// The file is written and synced under a temporary name, then renamed over
/// the previous one, so a failure leaves the old index untouched.
#[inline]
pub fn persist(index: &VectorIndex, location: &Path) -> Result<()> {
    persist_unless_cancelled(index, location, &AtomicBool::new(false))
}

/// Like [`persist`], but gives up before replacing the previous index once
/// `cancel` is set. A cancelled write removes its temporary file and returns
/// a persistence error; the previous `index.arrow` is left as it was.
#[inline]
pub fn persist_unless_cancelled(
    index: &VectorIndex,
    location: &Path,
    cancel: &AtomicBool,
) -> Result<()> {
    fs::create_dir_all(location).map_err(|e| {
        RagError::Persistence(format!(
            "Failed to create index directory {}: {}",
            location.display(),
            e
        ))
    })?;

    let final_path = location.join(INDEX_FILE);
    let temp_path = location.join(format!(".{}.{}.tmp", INDEX_FILE, Uuid::new_v4()));

    let batch = create_record_batch(index, SCHEMA_VERSION)?;
    let result = write_batch(&temp_path, &batch)
        .and_then(|()| {
            if cancel.load(Ordering::SeqCst) {
                Err(RagError::Persistence(format!(
                    "Write of {} was cancelled before it replaced the previous index",
                    final_path.display()
                )))
            } else {
                Ok(())
            }
        })
        .and_then(|()| {
            fs::rename(&temp_path, &final_path).map_err(|e| {
                RagError::Persistence(format!(
                    "Failed to move index into place at {}: {}",
                    final_path.display(),
                    e
                ))
            })
        });

    if let Err(e) = result {
        if temp_path.exists() {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                warn!(
                    "Failed to remove temporary index file {}: {}",
                    temp_path.display(),
                    cleanup
                );
            }
        }
        return Err(e);
    }

    info!(
        "Persisted vector index with {} entries to {}",
        index.len(),
        final_path.display()
    );
    Ok(())
}

/// Read the index stored in `location`
#[inline]
pub fn load(location: &Path) -> Result<VectorIndex> {
    let path = location.join(INDEX_FILE);
    if !path.is_file() {
        return Err(RagError::IndexNotFound(location.to_path_buf()));
    }

    debug!("Loading vector index from {}", path.display());

    let file = File::open(&path).map_err(|e| {
        RagError::Persistence(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let reader = FileReader::try_new(BufReader::new(file), None)
        .map_err(|e| corrupt(&path, &e.to_string()))?;

    let schema = reader.schema();
    let metadata = schema.metadata();

    let version = metadata
        .get(META_SCHEMA_VERSION)
        .ok_or_else(|| corrupt(&path, "missing schema version"))?;
    if version != SCHEMA_VERSION {
        return Err(RagError::Persistence(format!(
            "Index at {} uses schema version {}, this build reads version {}; rebuild the index",
            path.display(),
            version,
            SCHEMA_VERSION
        )));
    }

    let embedding_model = metadata
        .get(META_EMBEDDING_MODEL)
        .ok_or_else(|| corrupt(&path, "missing embedding model"))?
        .clone();
    let dimension: usize = metadata
        .get(META_DIMENSION)
        .and_then(|d| d.parse().ok())
        .ok_or_else(|| corrupt(&path, "missing or invalid dimension"))?;
    let built_at = metadata
        .get(META_BUILT_AT)
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| corrupt(&path, "missing or invalid build timestamp"))?;

    let mut entries = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| corrupt(&path, &e.to_string()))?;
        entries.extend(parse_batch(&batch, dimension).map_err(|e| corrupt(&path, &e))?);
    }

    let index = VectorIndex::from_entries(embedding_model, built_at, entries)
        .map_err(|e| corrupt(&path, &e.to_string()))?;
    if index.dimension() != dimension {
        return Err(corrupt(&path, "vector width differs from recorded dimension"));
    }

    info!(
        "Loaded vector index with {} entries from {}",
        index.len(),
        path.display()
    );
    Ok(index)
}

fn corrupt(path: &Path, reason: &str) -> RagError {
    RagError::Persistence(format!(
        "Index file {} is corrupt or incompatible: {}",
        path.display(),
        reason
    ))
}

fn create_schema(index: &VectorIndex, schema_version: &str) -> Arc<Schema> {
    let metadata = HashMap::from([
        (META_SCHEMA_VERSION.to_string(), schema_version.to_string()),
        (
            META_EMBEDDING_MODEL.to_string(),
            index.embedding_model().to_string(),
        ),
        (META_DIMENSION.to_string(), index.dimension().to_string()),
        (META_BUILT_AT.to_string(), index.built_at().to_rfc3339()),
    ]);

    Arc::new(
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    index.dimension() as i32,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt64, false),
            Field::new("start", DataType::UInt64, false),
            Field::new("char_count", DataType::UInt64, false),
        ])
        .with_metadata(metadata),
    )
}

fn create_record_batch(index: &VectorIndex, schema_version: &str) -> Result<RecordBatch> {
    let entries = index.entries();
    let len = entries.len();
    let dimension = index.dimension();

    let mut ids = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dimension);
    let mut contents = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut starts = Vec::with_capacity(len);
    let mut char_counts = Vec::with_capacity(len);

    for entry in entries {
        ids.push(entry.id.to_string());
        flat_values.extend_from_slice(&entry.vector);
        contents.push(entry.chunk.content.as_str());
        sources.push(entry.chunk.source.to_string_lossy().into_owned());
        chunk_indices.push(entry.chunk.chunk_index as u64);
        starts.push(entry.chunk.start as u64);
        char_counts.push(entry.chunk.char_count as u64);
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::Persistence(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(contents)),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt64Array::from(chunk_indices)),
        Arc::new(UInt64Array::from(starts)),
        Arc::new(UInt64Array::from(char_counts)),
    ];

    RecordBatch::try_new(create_schema(index, schema_version), arrays)
        .map_err(|e| RagError::Persistence(format!("Failed to create record batch: {}", e)))
}

fn write_batch(path: &Path, batch: &RecordBatch) -> Result<()> {
    let persistence = |e: &dyn std::fmt::Display| {
        RagError::Persistence(format!("Failed to write {}: {}", path.display(), e))
    };

    let file = File::create(path).map_err(|e| persistence(&e))?;
    let mut writer =
        FileWriter::try_new(BufWriter::new(file), &batch.schema()).map_err(|e| persistence(&e))?;
    writer.write(batch).map_err(|e| persistence(&e))?;
    writer.finish().map_err(|e| persistence(&e))?;

    let file = writer
        .into_inner()
        .map_err(|e| persistence(&e))?
        .into_inner()
        .map_err(|e| persistence(&e.into_error()))?;
    file.sync_all().map_err(|e| persistence(&e))?;

    Ok(())
}

fn parse_batch(batch: &RecordBatch, dimension: usize) -> Result<Vec<IndexEntry>, String> {
    let ids = string_column(batch, "id")?;
    let contents = string_column(batch, "content")?;
    let sources = string_column(batch, "source")?;
    let chunk_indices = u64_column(batch, "chunk_index")?;
    let starts = u64_column(batch, "start")?;
    let char_counts = u64_column(batch, "char_count")?;

    let vectors = batch
        .column_by_name("vector")
        .ok_or("Missing vector column")?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or("Invalid vector column type")?;
    if vectors.value_length() as usize != dimension {
        return Err(format!(
            "Vector column width {} differs from recorded dimension {}",
            vectors.value_length(),
            dimension
        ));
    }

    let mut entries = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let values = vectors.value(row);
        let vector = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or("Invalid vector value type")?
            .values()
            .to_vec();

        let id = Uuid::parse_str(ids.value(row)).map_err(|e| format!("Invalid entry id: {}", e))?;

        entries.push(IndexEntry {
            id,
            vector,
            chunk: Chunk {
                content: contents.value(row).to_string(),
                source: PathBuf::from(sources.value(row)),
                chunk_index: chunk_indices.value(row) as usize,
                start: starts.value(row) as usize,
                char_count: char_counts.value(row) as usize,
            },
        });
    }

    Ok(entries)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, String> {
    batch
        .column_by_name(name)
        .ok_or_else(|| format!("Missing {} column", name))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| format!("Invalid {} column type", name))
}

fn u64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array, String> {
    batch
        .column_by_name(name)
        .ok_or_else(|| format!("Missing {} column", name))?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| format!("Invalid {} column type", name))
}
