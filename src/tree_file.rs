//! Tree file container.
//!
//! A tree file is a JSON document holding an ordered list of named objects:
//!
//! ```json
//! {"objects": [
//!     {"name": "cutflow", "class": "TH1F", "data": {"bins": [10, 8, 5]}},
//!     {"name": "NOMINAL", "class": "TTree", "data": {"entries": [{"n_jets": 5, ...}]}}
//! ]}
//! ```
//!
//! Objects of class `TTree` hold rows ("entries") of named branches. Objects of any other class
//! are opaque and are only ever copied. Files with a `.gz` or `.zlib` extension are compressed.

use crate::compression::{self, Compression};
use crate::error::TransformerError;
use crate::types::Entry;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Class name of row containers.
pub const TREE_CLASS: &str = "TTree";

/// An object stored in a tree file.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NamedObject {
    /// Object name (key)
    pub name: String,
    /// Object class
    pub class: String,
    /// Object payload
    pub data: Value,
}

impl NamedObject {
    /// Return a new NamedObject.
    pub fn new(name: &str, class: &str, data: Value) -> Self {
        NamedObject {
            name: name.to_string(),
            class: class.to_string(),
            data,
        }
    }

    /// Return a NamedObject holding a tree.
    pub fn tree(name: &str, tree: Tree) -> Self {
        let entries = tree.entries.into_iter().map(Value::Object).collect();
        let mut data = serde_json::Map::new();
        data.insert("entries".to_string(), Value::Array(entries));
        NamedObject::new(name, TREE_CLASS, Value::Object(data))
    }

    /// Whether the object is a row container.
    pub fn is_tree(&self) -> bool {
        self.class == TREE_CLASS
    }
}

/// A row container.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Tree {
    pub entries: Vec<Entry>,
}

/// An in-memory tree file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TreeFile {
    pub objects: Vec<NamedObject>,
}

impl TreeFile {
    /// Read a tree file from disk.
    ///
    /// # Arguments
    ///
    /// * `path`: Path of the file. The extension selects decompression.
    pub fn open(path: &Path) -> Result<Self, TransformerError> {
        let data = std::fs::read(path).map_err(|source| TransformerError::InputOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let data = match Compression::from_path(path) {
            Some(compression) => compression::decompress(compression, &data)?,
            None => data,
        };
        serde_json::from_slice(&data).map_err(|source| TransformerError::FileFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the tree file to disk, replacing any existing file.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Arguments
    ///
    /// * `path`: Path of the file. The extension selects compression.
    pub fn save(&self, path: &Path) -> Result<u64, TransformerError> {
        let data = serde_json::to_vec(self).map_err(|source| TransformerError::Serialise {
            record: "tree file",
            source,
        })?;
        let data = match Compression::from_path(path) {
            Some(compression) => compression::compress(compression, &data)?,
            None => data,
        };
        std::fs::write(path, &data).map_err(|source| TransformerError::OutputWrite {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(data.len() as u64)
    }

    /// Split the file into its non-tree objects, in stored order, and the named tree.
    ///
    /// Trees other than the named one are discarded. If several trees share the name, the first
    /// is used.
    ///
    /// # Arguments
    ///
    /// * `tree_name`: Name of the tree to extract
    pub fn split(self, tree_name: &str) -> Result<(Vec<NamedObject>, Tree), TransformerError> {
        let mut tree = None;
        let mut others = Vec::new();
        for object in self.objects {
            if !object.is_tree() {
                others.push(object);
            } else if tree.is_none() && object.name == tree_name {
                tree = Some(object.data);
            }
        }
        let data = tree.ok_or_else(|| TransformerError::TreeNotFound {
            tree: tree_name.to_string(),
        })?;
        let tree = serde_json::from_value(data).map_err(|source| TransformerError::TreeFormat {
            tree: tree_name.to_string(),
            source,
        })?;
        Ok((others, tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    use serde_json::json;

    fn sample() -> TreeFile {
        let jets = test_utils::spread_jets(5, &[0, 1, 0, 0, 1]);
        test_utils::tree_file(vec![test_utils::entry(&jets, Some(test_utils::ditau()))])
    }

    #[test]
    fn save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["out.json", "out.json.gz", "out.zlib"] {
            let path = dir.path().join(name);
            let file = sample();
            let bytes = file.save(&path).unwrap();
            assert_eq!(std::fs::metadata(&path).unwrap().len(), bytes);
            assert_eq!(file, TreeFile::open(&path).unwrap());
        }
    }

    #[test]
    fn save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "x".repeat(100_000)).unwrap();
        let bytes = TreeFile::default().save(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), bytes);
        assert_eq!(TreeFile::default(), TreeFile::open(&path).unwrap());
    }

    #[test]
    fn open_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        match TreeFile::open(&path).unwrap_err() {
            TransformerError::InputOpen { path: error_path, source } => {
                assert_eq!(path, error_path);
                assert_eq!(std::io::ErrorKind::NotFound, source.kind());
            }
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn open_not_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            TreeFile::open(&path).unwrap_err(),
            TransformerError::FileFormat { .. }
        ));
    }

    #[test]
    fn split_keeps_non_trees_in_order() {
        let (others, tree) = sample().split("NOMINAL").unwrap();
        let names: Vec<&str> = others.iter().map(|object| object.name.as_str()).collect();
        assert_eq!(vec!["cutflow", "metadata"], names);
        assert_eq!(1, tree.entries.len());
    }

    #[test]
    fn split_missing_tree() {
        match sample().split("Events").unwrap_err() {
            TransformerError::TreeNotFound { tree } => assert_eq!("Events", tree),
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn split_ignores_non_tree_with_tree_name() {
        let file = TreeFile {
            objects: vec![NamedObject::new("NOMINAL", "TH1F", json!({}))],
        };
        assert!(matches!(
            file.split("NOMINAL").unwrap_err(),
            TransformerError::TreeNotFound { .. }
        ));
    }

    #[test]
    fn split_malformed_tree() {
        let file = TreeFile {
            objects: vec![NamedObject::new("NOMINAL", TREE_CLASS, json!({"rows": []}))],
        };
        assert!(matches!(
            file.split("NOMINAL").unwrap_err(),
            TransformerError::TreeFormat { .. }
        ));
    }

    #[test]
    fn tree_object() {
        let object = NamedObject::tree("NOMINAL", Tree::default());
        assert!(object.is_tree());
        assert_eq!(json!({"entries": []}), object.data);
    }
}
