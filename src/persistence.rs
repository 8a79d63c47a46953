//! Persistence layer for saving/loading document trees.
//!
//! Supports both JSON (human-readable) and bincode (efficient binary) formats.

use crate::error::{PageIndexError, Result};
use crate::tree::DocumentTree;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory for structure files when no output path is given.
pub const DEFAULT_RESULTS_DIR: &str = "results";

/// `results/<document stem>_structure.json`.
pub fn default_output_path(document: &Path) -> PathBuf {
    let stem = document
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    Path::new(DEFAULT_RESULTS_DIR).join(format!("{}_structure.json", stem))
}

/// Save format for tree indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// JSON format (human-readable, larger).
    Json,
    /// Bincode format (binary, compact).
    Bincode,
}

impl SaveFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => SaveFormat::Json,
            Some("bin") | Some("bincode") => SaveFormat::Bincode,
            _ => SaveFormat::Json, // Default to JSON
        }
    }
}

/// Save a DocumentTree to a file.
pub fn save_tree(tree: &DocumentTree, path: &Path) -> Result<()> {
    let format = SaveFormat::from_path(path);
    save_tree_with_format(tree, path, format)
}

/// Save a DocumentTree with specific format.
pub fn save_tree_with_format(tree: &DocumentTree, path: &Path, format: SaveFormat) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| PageIndexError::io(parent, e))?;
        }
    }

    let data = match format {
        SaveFormat::Json => tree.to_json()?.into_bytes(),
        SaveFormat::Bincode => {
            let config = bincode::config::standard();
            bincode::encode_to_vec(tree, config)
                .map_err(|e| PageIndexError::Serialization(e.to_string()))?
        }
    };

    fs::write(path, &data).map_err(|e| PageIndexError::io(path, e))?;

    Ok(())
}

/// Load a DocumentTree from a file.
pub fn load_tree(path: &Path) -> Result<DocumentTree> {
    if !path.exists() {
        return Err(PageIndexError::IndexNotFound(path.to_path_buf()));
    }

    let format = SaveFormat::from_path(path);
    load_tree_with_format(path, format)
}

/// Load a DocumentTree with specific format.
pub fn load_tree_with_format(path: &Path, format: SaveFormat) -> Result<DocumentTree> {
    let data = fs::read(path).map_err(|e| PageIndexError::io(path, e))?;

    let mut tree = match format {
        SaveFormat::Json => {
            let json_str = String::from_utf8(data)
                .map_err(|e| PageIndexError::Serialization(e.to_string()))?;
            DocumentTree::from_json(&json_str)?
        }
        SaveFormat::Bincode => {
            let config = bincode::config::standard();
            let (tree, _): (DocumentTree, usize) = bincode::decode_from_slice(&data, config)
                .map_err(|e| PageIndexError::Serialization(e.to_string()))?;
            tree
        }
    };
    tree.assign_levels();

    Ok(tree)
}

/// Check if an index file exists at the given path.
pub fn tree_exists(path: &Path) -> bool {
    path.exists() && path.is_file()
}

/// Get the size of an index file in bytes.
pub fn tree_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| PageIndexError::io(path, e))?;
    Ok(metadata.len())
}
