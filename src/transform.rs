//! Selection and output writing.
//!
//! Reads a tree file, keeps the entries of one tree that satisfy a [Selection], appends the
//! reconstructed columns to each kept entry and writes a new tree file. Non-tree objects are copied
//! verbatim ahead of the transformed tree.

use crate::error::TransformerError;
use crate::reconstruction::reconstruct;
use crate::selection::Selection;
use crate::tree_file::{NamedObject, Tree, TreeFile};
use crate::types::{Entry, Event};

use rayon::prelude::*;
use std::path::Path;
use tracing::{event, Level};

/// Tree read when none is configured.
pub const DEFAULT_TREE: &str = "NOMINAL";

/// Options controlling a transform.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformOptions {
    /// Name of the tree to select from
    pub tree: String,
    /// Row predicate
    pub selection: Selection,
    /// Whether to reconstruct entries in parallel using Rayon
    pub use_rayon: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        TransformOptions {
            tree: DEFAULT_TREE.to_string(),
            selection: Selection::default(),
            use_rayon: false,
        }
    }
}

/// Counters describing a completed transform.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransformSummary {
    /// Entries in the input tree
    pub entries_read: u64,
    /// Entries written to the output tree
    pub entries_written: u64,
    /// Size of the output file in bytes
    pub bytes_written: u64,
}

/// Apply the selection to one entry and append the derived columns if it is kept.
fn transform_entry(
    selection: &Selection,
    index: usize,
    mut entry: Entry,
) -> Result<Option<Entry>, TransformerError> {
    if !selection.matches(index, &entry)? {
        return Ok(None);
    }
    let event = Event::from_entry(index, &entry)?;
    reconstruct(&event)?.append_to(&mut entry);
    Ok(Some(entry))
}

/// Transform the entries of a tree, preserving their order.
///
/// The first failing entry aborts the transform; entries are never skipped on error.
pub fn transform_tree(tree: Tree, options: &TransformOptions) -> Result<Tree, TransformerError> {
    let selection = &options.selection;
    let entries: Vec<Option<Entry>> = if options.use_rayon {
        tree.entries
            .into_par_iter()
            .enumerate()
            .map(|(index, entry)| transform_entry(selection, index, entry))
            .collect::<Result<_, _>>()?
    } else {
        tree.entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| transform_entry(selection, index, entry))
            .collect::<Result<_, _>>()?
    };
    Ok(Tree {
        entries: entries.into_iter().flatten().collect(),
    })
}

/// Transform a tree file.
///
/// Any existing file at `output` is replaced. On error the output may be missing or partial.
///
/// # Arguments
///
/// * `input`: Path of the input tree file
/// * `output`: Path of the output tree file
/// * `options`: Transform options
pub fn transform_file(
    input: &Path,
    output: &Path,
    options: &TransformOptions,
) -> Result<TransformSummary, TransformerError> {
    let (mut objects, tree) = TreeFile::open(input)?.split(&options.tree)?;
    let entries_read = tree.entries.len() as u64;
    let tree = transform_tree(tree, options)?;
    let entries_written = tree.entries.len() as u64;
    objects.push(NamedObject::tree(&options.tree, tree));
    let bytes_written = TreeFile { objects }.save(output)?;
    event!(
        Level::INFO,
        input = %input.display(),
        output = %output.display(),
        entries_read,
        entries_written,
        bytes_written,
        "Transformed tree {}", options.tree
    );
    Ok(TransformSummary {
        entries_read,
        entries_written,
        bytes_written,
    })
}
