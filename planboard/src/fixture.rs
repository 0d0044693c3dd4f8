//! JSON fixtures: a whole store as one file.
//!
//! The file maps collection names to objects of `id -> fields`:
//!
//! ```json
//! {
//!   "projects": { "p1": { "title": "Launch", "members": ["u1"] } },
//!   "tasks": { "t1": { "title": "Draft", "status": "todo",
//!                      "createdAt": { "seconds": 1706695200, "nanoseconds": 0 } } }
//! }
//! ```
//!
//! Field values follow [`FieldValue::from_json`](planboard_model::document::FieldValue::from_json),
//! so store-native timestamps survive a load/save cycle.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use planboard_model::DecodeError;
use planboard_model::document::{Document, DocumentId};

use crate::store::memory::MemoryStore;

/// Errors raised while reading or writing a fixture.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// The fixture file could not be read.
    #[error("failed to read fixture {path}: {source}")]
    Read {
        /// Fixture path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The fixture file could not be written.
    #[error("failed to write fixture {path}: {source}")]
    Write {
        /// Fixture path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid JSON.
    #[error("invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON is not an object of collections of documents.
    #[error("invalid fixture layout: {0}")]
    Layout(String),

    /// A document's fields have no store equivalent.
    #[error("document {collection}/{id}: {source}")]
    Document {
        /// Collection of the document.
        collection: String,
        /// Document id.
        id: String,
        /// Decode failure.
        source: DecodeError,
    },
}

/// Load a store from the fixture at `path`. A missing file is an empty store.
///
/// # Errors
///
/// Returns a [`FixtureError`] if the file exists but cannot be read or
/// parsed.
pub fn load(path: &Path) -> Result<MemoryStore, FixtureError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse(&contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no fixture yet, starting empty");
            Ok(MemoryStore::new())
        }
        Err(source) => Err(FixtureError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write every collection of `store` to `path`.
///
/// # Errors
///
/// Returns [`FixtureError::Write`] if the file cannot be written.
pub fn save(store: &MemoryStore, path: &Path) -> Result<(), FixtureError> {
    let contents = render(store)?;
    std::fs::write(path, contents).map_err(|source| FixtureError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "fixture saved");
    Ok(())
}

/// Build a store from fixture JSON text.
///
/// # Errors
///
/// Returns a [`FixtureError`] if the text is not a valid fixture.
pub fn parse(contents: &str) -> Result<MemoryStore, FixtureError> {
    let Value::Object(collections) = serde_json::from_str(contents)? else {
        return Err(FixtureError::Layout("top level must be an object".into()));
    };

    let store = MemoryStore::new();
    for (collection, documents) in collections {
        let Value::Object(documents) = documents else {
            return Err(FixtureError::Layout(format!(
                "collection {collection:?} must be an object of documents"
            )));
        };
        for (id, fields) in documents {
            let doc = Document::from_json(DocumentId::new(id.clone()), fields).map_err(|source| {
                FixtureError::Document {
                    collection: collection.clone(),
                    id,
                    source,
                }
            })?;
            store.insert(&collection, doc.id, doc.fields);
        }
    }
    Ok(store)
}

/// Render `store` as pretty-printed fixture JSON.
///
/// # Errors
///
/// Returns [`FixtureError::Json`] if serialization fails.
pub fn render(store: &MemoryStore) -> Result<String, FixtureError> {
    let collections: Map<String, Value> = store
        .collection_names()
        .into_iter()
        .map(|name| {
            let documents: Map<String, Value> = store
                .documents(&name)
                .into_iter()
                .map(|doc| (doc.id.to_string(), doc.fields_to_json()))
                .collect();
            (name, Value::Object(documents))
        })
        .collect();
    Ok(serde_json::to_string_pretty(&Value::Object(collections))?)
}
