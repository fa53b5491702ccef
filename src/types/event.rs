//! Typed view of a tree entry
//!
//! Tree entries are maps of branch name to JSON value. The reconstruction works on an [Event],
//! which holds the jets as a fixed-size ordered array rather than by branch name.

use crate::error::TransformerError;
use crate::types::LorentzVector;

use serde_json::Value;

/// Maximum number of jets stored per entry.
pub const MAX_JETS: usize = 8;

/// Branch holding the number of jets in the entry.
pub const N_JETS_BRANCH: &str = "n_jets";
/// Ditau transverse momentum branch.
pub const DITAU_PT_BRANCH: &str = "ditau_mmc_maxw_pt";
/// Ditau pseudorapidity branch.
pub const DITAU_ETA_BRANCH: &str = "ditau_mmc_maxw_eta";
/// Ditau azimuth branch.
pub const DITAU_PHI_BRANCH: &str = "ditau_mmc_maxw_phi";

/// A tree entry: branch name to value.
pub type Entry = serde_json::Map<String, Value>;

/// Name of the 4-momentum branch of jet `index`.
pub fn jet_p4_branch(index: usize) -> String {
    format!("jet_{}_p4", index)
}

/// Name of the b-tag branch of jet `index`.
pub fn jet_btag_branch(index: usize) -> String {
    format!("jet_{}_b_tagged_DL1r_FixedCutBEff_70", index)
}

/// A single jet.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JetRecord {
    /// 4-momentum in GeV
    pub p4: LorentzVector,
    /// b-tag flag. 1 means b-tagged and 0 means not b-tagged; other values are neither.
    pub b_tag: i64,
}

impl JetRecord {
    /// Return a new JetRecord.
    pub fn new(p4: LorentzVector, b_tag: i64) -> Self {
        JetRecord { p4, b_tag }
    }
}

/// Reconstructed ditau kinematics (GeV, mass not stored).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Ditau {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
}

/// The reconstruction inputs of one tree entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Position of the entry in the input tree
    pub entry: usize,
    /// Number of jets as stored in the entry. May exceed [MAX_JETS].
    pub n_jets: i64,
    /// Jet records. Only the first [Event::jet_count] are meaningful.
    pub jets: [JetRecord; MAX_JETS],
    /// Ditau kinematics, if the entry provides them
    pub ditau: Option<Ditau>,
}

impl Event {
    /// Return a new Event with the given jets. `n_jets` is set to the number of jets supplied.
    ///
    /// # Panics
    ///
    /// If more than [MAX_JETS] jets are supplied.
    pub fn new(entry: usize, jets: &[JetRecord], ditau: Option<Ditau>) -> Self {
        assert!(jets.len() <= MAX_JETS, "at most {} jets", MAX_JETS);
        let mut records = [JetRecord::default(); MAX_JETS];
        records[..jets.len()].copy_from_slice(jets);
        Event {
            entry,
            n_jets: jets.len() as i64,
            jets: records,
            ditau,
        }
    }

    /// Number of usable jets: `n_jets` clamped to [0, MAX_JETS].
    pub fn jet_count(&self) -> usize {
        self.n_jets.clamp(0, MAX_JETS as i64) as usize
    }

    /// The usable jets in stored order.
    pub fn jets(&self) -> &[JetRecord] {
        &self.jets[..self.jet_count()]
    }

    /// Build an Event from a tree entry.
    ///
    /// Only the jet branches within [Event::jet_count] are read. The ditau branches are
    /// optional; their absence only matters if the reconstruction needs them.
    ///
    /// # Arguments
    ///
    /// * `index`: Position of the entry in the tree
    /// * `entry`: The tree entry
    pub fn from_entry(index: usize, entry: &Entry) -> Result<Self, TransformerError> {
        let n_jets = integer_branch(entry, index, N_JETS_BRANCH)?;
        let mut event = Event {
            entry: index,
            n_jets,
            jets: [JetRecord::default(); MAX_JETS],
            ditau: None,
        };
        for i in 0..event.jet_count() {
            let p4_branch = jet_p4_branch(i);
            let p4 = required(entry, index, &p4_branch)?;
            let p4: LorentzVector =
                serde_json::from_value(p4.clone()).map_err(|_| TransformerError::BranchType {
                    branch: p4_branch,
                    entry: index,
                    expected: "a 4-vector",
                })?;
            let b_tag = integer_branch(entry, index, &jet_btag_branch(i))?;
            event.jets[i] = JetRecord::new(p4, b_tag);
        }
        event.ditau = match (
            entry.get(DITAU_PT_BRANCH),
            entry.get(DITAU_ETA_BRANCH),
            entry.get(DITAU_PHI_BRANCH),
        ) {
            (None, None, None) => None,
            _ => Some(Ditau {
                pt: float_branch(entry, index, DITAU_PT_BRANCH)?,
                eta: float_branch(entry, index, DITAU_ETA_BRANCH)?,
                phi: float_branch(entry, index, DITAU_PHI_BRANCH)?,
            }),
        };
        Ok(event)
    }
}

/// Return a branch value or a [TransformerError::BranchMissing] error.
pub fn required<'a>(
    entry: &'a Entry,
    index: usize,
    branch: &str,
) -> Result<&'a Value, TransformerError> {
    entry
        .get(branch)
        .ok_or_else(|| TransformerError::BranchMissing {
            branch: branch.to_string(),
            entry: index,
        })
}

/// Read a numeric branch as an f64.
pub fn float_branch(entry: &Entry, index: usize, branch: &str) -> Result<f64, TransformerError> {
    required(entry, index, branch)?
        .as_f64()
        .ok_or_else(|| TransformerError::BranchType {
            branch: branch.to_string(),
            entry: index,
            expected: "a number",
        })
}

/// Read an integer branch. Integral floating point values and booleans are accepted.
fn integer_branch(entry: &Entry, index: usize, branch: &str) -> Result<i64, TransformerError> {
    let value = required(entry, index, branch)?;
    let integer = match value {
        Value::Bool(flag) => Some(i64::from(*flag)),
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < i64::MAX as f64)
                .map(|float| float as i64)
        }),
        _ => None,
    };
    integer.ok_or_else(|| TransformerError::BranchType {
        branch: branch.to_string(),
        entry: index,
        expected: "an integer",
    })
}
