use crate::error::TransformerError;
use crate::messaging::{Acknowledger, Delivery, FailurePublisher, Settlement};
use crate::models::{ErrorRecord, FileComplete, StatusCode, TransformRequest};
use crate::object_store::ObjectStore;
use crate::status::StatusReporter;
use crate::tree_file::{NamedObject, Tree, TreeFile};
use crate::types::event::{
    jet_btag_branch, jet_p4_branch, DITAU_ETA_BRANCH, DITAU_PHI_BRANCH, DITAU_PT_BRANCH,
    N_JETS_BRANCH,
};
use crate::types::{Ditau, Entry, Event, JetRecord, LorentzVector};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use url::Url;

/// Create a TransformRequest with all fields set.
pub(crate) fn get_test_request() -> TransformRequest {
    TransformRequest {
        request_id: "1234-abcd".to_string(),
        file_path: "/data/mc16e/ntuple.root".to_string(),
        file_id: "42".to_string(),
        service_endpoint: Url::parse("http://servicex.example.com/servicex/internal/1234-abcd")
            .unwrap(),
        tree_name: "NOMINAL".to_string(),
    }
}

/// Ditau kinematics used by the test events.
pub(crate) fn ditau() -> Ditau {
    Ditau {
        pt: 60.0,
        eta: -0.3,
        phi: -1.5,
    }
}

/// `n` massless jets well separated in azimuth, with the given b-tags.
pub(crate) fn spread_jets(n: usize, tags: &[i64]) -> Vec<JetRecord> {
    (0..n)
        .map(|i| {
            let p4 = LorentzVector::from_pt_eta_phi_m(
                30.0 + 10.0 * i as f64,
                0.2 * i as f64,
                -3.0 + 0.7 * i as f64,
                0.0,
            );
            JetRecord::new(p4, tags[i])
        })
        .collect()
}

/// Six jets: a non-b pair with invariant mass 80.4 GeV, two b-jets separated by ΔR = 0.8 and two
/// soft non-b jets whose pairings are all far from the W mass.
pub(crate) fn signal_jets() -> Vec<JetRecord> {
    let w_pt = 80.4 / (2.0 * 0.5_f64.sin());
    let jet = |pt: f64, eta: f64, phi: f64, b_tag: i64| {
        JetRecord::new(LorentzVector::from_pt_eta_phi_m(pt, eta, phi, 0.0), b_tag)
    };
    vec![
        jet(w_pt, 0.0, 0.0, 0),
        jet(w_pt, 0.0, 1.0, 0),
        jet(40.0, 0.5, 2.0, 1),
        jet(5.0, 0.0, 2.5, 0),
        jet(45.0, 0.5, 2.8, 1),
        jet(5.0, 0.0, -2.0, 0),
    ]
}

/// The signal jets as an Event.
pub(crate) fn signal_event(index: usize) -> Event {
    Event::new(index, &signal_jets(), Some(ditau()))
}

/// Build a tree entry from jets and optional ditau kinematics.
pub(crate) fn entry(jets: &[JetRecord], ditau: Option<Ditau>) -> Entry {
    let mut entry = Entry::new();
    entry.insert(N_JETS_BRANCH.to_string(), json!(jets.len()));
    for (i, jet) in jets.iter().enumerate() {
        entry.insert(jet_p4_branch(i), serde_json::to_value(jet.p4).unwrap());
        entry.insert(jet_btag_branch(i), json!(jet.b_tag));
    }
    if let Some(ditau) = ditau {
        entry.insert(DITAU_PT_BRANCH.to_string(), json!(ditau.pt));
        entry.insert(DITAU_ETA_BRANCH.to_string(), json!(ditau.eta));
        entry.insert(DITAU_PHI_BRANCH.to_string(), json!(ditau.phi));
    }
    entry
}

/// A tree file with metadata objects around a NOMINAL tree of the given entries.
pub(crate) fn tree_file(entries: Vec<Entry>) -> TreeFile {
    TreeFile {
        objects: vec![
            NamedObject::new("cutflow", "TH1F", json!({"bins": [10, 8, 5]})),
            NamedObject::tree("NOMINAL", Tree { entries }),
            NamedObject::new("sumWeights", "TTree", json!({"entries": [{"w": 1.5}]})),
            NamedObject::new("metadata", "TObjString", Value::from("mc16e")),
        ],
    }
}

/// A call made by the worker to one of its collaborators.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    Status {
        file_id: String,
        status_code: StatusCode,
        info: String,
    },
    FileComplete(FileComplete),
    Publish(ErrorRecord),
    Upload {
        bucket: String,
        key: String,
        path: PathBuf,
    },
    Settle(Settlement),
}

/// A test double for every collaborator of the worker.
///
/// Records calls in order into a shared log. Operations named in `failing` record the call and
/// then fail. Operation names are the status codes `start`, `complete` and `failure`, plus
/// `file-complete`, `publish`, `upload` and `settle`.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
    failing: Vec<&'static str>,
}

impl Recorder {
    pub(crate) fn failing(operations: &[&'static str]) -> Self {
        Recorder {
            failing: operations.to_vec(),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Return a delivery with the given body, settled through this recorder.
    pub(crate) fn delivery(&self, body: &[u8]) -> Delivery {
        Delivery::new(body.to_vec(), Box::new(self.clone()))
    }

    fn record(&self, operation: &str, call: Call) -> Result<(), TransformerError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.iter().any(|failing| *failing == operation) {
            return Err(TransformerError::Config {
                message: format!("injected {} failure", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StatusReporter for Recorder {
    async fn post_status(
        &self,
        _endpoint: &Url,
        file_id: &str,
        status_code: StatusCode,
        info: &str,
    ) -> Result<(), TransformerError> {
        let call = Call::Status {
            file_id: file_id.to_string(),
            status_code,
            info: info.to_string(),
        };
        self.record(&status_code.to_string(), call)
    }

    async fn put_file_complete(
        &self,
        _endpoint: &Url,
        record: &FileComplete,
    ) -> Result<(), TransformerError> {
        self.record("file-complete", Call::FileComplete(record.clone()))
    }
}

#[async_trait]
impl FailurePublisher for Recorder {
    async fn publish_failure(&self, record: &ErrorRecord) -> Result<(), TransformerError> {
        self.record("publish", Call::Publish(record.clone()))
    }
}

#[async_trait]
impl ObjectStore for Recorder {
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<(), TransformerError> {
        let call = Call::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            path: path.to_path_buf(),
        };
        self.record("upload", call)
    }
}

#[async_trait]
impl Acknowledger for Recorder {
    async fn ack(&self) -> Result<(), TransformerError> {
        self.record("settle", Call::Settle(Settlement::Ack))
    }

    async fn nack(&self, requeue: bool) -> Result<(), TransformerError> {
        self.record("settle", Call::Settle(Settlement::Nack { requeue }))
    }
}
