//! Audit lifecycle state machine
//!
//! Governs how a machine verdict is confirmed, challenged and finalized by the
//! two human actors.
//!
//! | Actor   | From                                   | Action           | To                          |
//! |---------|----------------------------------------|------------------|-----------------------------|
//! | Auditor | NOT_VERIFIABLE                         | flag for review  | PENDING_AUDITOR_FLAG        |
//! | Citizen | PENDING_AUDITOR_FLAG, NOT_VERIFIABLE   | submit appeal    | PENDING_CITIZEN_APPEAL      |
//! | Auditor | PENDING_CITIZEN_APPEAL                 | accept solar     | VERIFIABLE (has_solar)      |
//! | Auditor | PENDING_CITIZEN_APPEAL                 | verify empty     | VERIFIABLE (no solar)       |
//! | Auditor | PENDING_CITIZEN_APPEAL                 | reject evidence  | NOT_VERIFIABLE              |
//! | Auditor | VERIFIABLE                             | unlock           | NOT_VERIFIABLE              |
//!
//! Every transition appends exactly one note. Manual override is a separate
//! operation ([`apply_override`]) that is accepted from any state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use surya_common::record::round2;
use surya_common::{BufferZone, Error, QcStatus, Result, SiteRecord};
use tracing::{info, warn};

use crate::services::record_store::RecordStore;

pub const NOTE_FLAGGED: &str = "Flagged by Auditor";
pub const NOTE_APPEAL: &str = "Citizen Initiated Appeal";
pub const NOTE_SOLAR_VERIFIED: &str = "Solar Verified by Auditor";
pub const NOTE_CONFIRMED_EMPTY: &str = "Confirmed Empty by Auditor";
pub const NOTE_EVIDENCE_REJECTED: &str = "Evidence Rejected - Re-upload Requested";
pub const NOTE_REOPENED: &str = "Re-opened by Auditor";

/// Human actor performing a lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Auditor,
    Citizen,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Auditor => f.write_str("auditor"),
            Actor::Citizen => f.write_str("citizen"),
        }
    }
}

/// Regular lifecycle action
#[derive(Debug, Clone, PartialEq)]
pub enum AuditAction {
    FlagForReview,
    /// `proof` is the stored upload backing the appeal
    SubmitAppeal { proof: PathBuf },
    /// `zone` falls back to the record's current ring when omitted
    AcceptSolar { zone: Option<BufferZone> },
    VerifyEmpty,
    RejectEvidence,
    Unlock,
}

impl AuditAction {
    /// Actor allowed to perform this action
    pub fn actor(&self) -> Actor {
        match self {
            AuditAction::SubmitAppeal { .. } => Actor::Citizen,
            _ => Actor::Auditor,
        }
    }

    /// Note appended when the action succeeds
    pub fn note(&self) -> String {
        match self {
            AuditAction::FlagForReview => NOTE_FLAGGED.to_string(),
            AuditAction::SubmitAppeal { proof } => match proof_name(proof) {
                Some(name) => format!("{} (proof: {})", NOTE_APPEAL, name),
                None => NOTE_APPEAL.to_string(),
            },
            AuditAction::AcceptSolar { .. } => NOTE_SOLAR_VERIFIED.to_string(),
            AuditAction::VerifyEmpty => NOTE_CONFIRMED_EMPTY.to_string(),
            AuditAction::RejectEvidence => NOTE_EVIDENCE_REJECTED.to_string(),
            AuditAction::Unlock => NOTE_REOPENED.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuditAction::FlagForReview => "flag-for-review",
            AuditAction::SubmitAppeal { .. } => "submit-appeal",
            AuditAction::AcceptSolar { .. } => "accept-solar",
            AuditAction::VerifyEmpty => "verify-empty",
            AuditAction::RejectEvidence => "reject-evidence",
            AuditAction::Unlock => "unlock",
        }
    }
}

/// Resulting `(qc_status, has_solar)` of a permitted transition
pub fn next_state(current: QcStatus, actor: Actor, action: &AuditAction) -> Result<(QcStatus, bool)> {
    if actor != action.actor() {
        return Err(Error::InvalidTransition(format!(
            "{} may not perform {}",
            actor,
            action.name()
        )));
    }

    let next = match (current, action) {
        (QcStatus::NotVerifiable, AuditAction::FlagForReview) => (QcStatus::PendingAuditorFlag, false),
        (
            QcStatus::PendingAuditorFlag | QcStatus::NotVerifiable,
            AuditAction::SubmitAppeal { .. },
        ) => (QcStatus::PendingCitizenAppeal, false),
        (QcStatus::PendingCitizenAppeal, AuditAction::AcceptSolar { .. }) => (QcStatus::Verifiable, true),
        (QcStatus::PendingCitizenAppeal, AuditAction::VerifyEmpty) => (QcStatus::Verifiable, false),
        (QcStatus::PendingCitizenAppeal, AuditAction::RejectEvidence) => (QcStatus::NotVerifiable, false),
        (QcStatus::Verifiable, AuditAction::Unlock) => (QcStatus::NotVerifiable, false),
        (state, action) => {
            return Err(Error::InvalidTransition(format!(
                "{} not allowed from {}",
                action.name(),
                state
            )))
        }
    };
    Ok(next)
}

/// Apply a regular transition in memory
///
/// On error the record is left untouched.
pub fn apply_action(record: &mut SiteRecord, actor: Actor, action: &AuditAction) -> Result<()> {
    let (status, has_solar) = next_state(record.qc_status, actor, action)?;

    let zone = match action {
        AuditAction::AcceptSolar { zone } => {
            let zone = zone.unwrap_or(record.buffer_zone);
            if zone.is_none() {
                return Err(Error::InvalidInput(format!(
                    "{}: accepting solar requires a buffer zone",
                    record.sample_id
                )));
            }
            zone
        }
        _ => record.buffer_zone,
    };

    record.qc_status = status;
    record.has_solar = has_solar;
    record.buffer_zone = zone;
    if let AuditAction::SubmitAppeal { proof } = action {
        // a later appeal replaces the earlier upload
        record.appeal_proof = proof_name(proof).map(str::to_string);
    }
    record.push_note(action.note());
    Ok(())
}

/// File name of a stored proof, as kept on the record
fn proof_name(proof: &Path) -> Option<&str> {
    proof.file_name().and_then(|n| n.to_str())
}

/// Verdict chosen by an auditor override
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideVerdict {
    Solar { zone: BufferZone },
    Empty,
    NotVerifiable,
}

/// Direct auditor correction, accepted from any state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    #[serde(flatten)]
    pub verdict: OverrideVerdict,
    #[serde(default)]
    pub total_area_sqm: Option<f64>,
    #[serde(default)]
    pub max_confidence: Option<f64>,
    /// Replaces the whole note list when present
    #[serde(default)]
    pub notes: Option<Vec<String>>,
}

impl ManualOverride {
    pub fn new(verdict: OverrideVerdict) -> Self {
        Self {
            verdict,
            total_area_sqm: None,
            max_confidence: None,
            notes: None,
        }
    }

    fn note(&self) -> String {
        match self.verdict {
            OverrideVerdict::Solar { zone } => format!("Manual Override by Auditor: SOLAR ({})", zone),
            OverrideVerdict::Empty => "Manual Override by Auditor: EMPTY".to_string(),
            OverrideVerdict::NotVerifiable => "Manual Override by Auditor: NOT_VERIFIABLE".to_string(),
        }
    }
}

/// Apply a manual override in memory
pub fn apply_override(record: &mut SiteRecord, edit: &ManualOverride) -> Result<()> {
    if let Some(area) = edit.total_area_sqm {
        if !area.is_finite() || area < 0.0 {
            return Err(Error::InvalidInput(format!("invalid area {}", area)));
        }
    }
    if let Some(conf) = edit.max_confidence {
        if !(0.0..=1.0).contains(&conf) {
            return Err(Error::InvalidInput(format!("invalid confidence {}", conf)));
        }
    }

    let (status, has_solar, zone) = match edit.verdict {
        OverrideVerdict::Solar { zone } => {
            if zone.is_none() {
                return Err(Error::InvalidInput(
                    "solar override requires ZONE_A or ZONE_B".to_string(),
                ));
            }
            (QcStatus::Verifiable, true, zone)
        }
        OverrideVerdict::Empty => (QcStatus::Verifiable, false, record.buffer_zone),
        OverrideVerdict::NotVerifiable => (QcStatus::NotVerifiable, false, record.buffer_zone),
    };

    record.qc_status = status;
    record.has_solar = has_solar;
    record.buffer_zone = zone;
    if let Some(area) = edit.total_area_sqm {
        record.total_area_sqm = round2(area);
    }
    if let Some(conf) = edit.max_confidence {
        record.max_confidence = round2(conf);
    }
    if let Some(notes) = &edit.notes {
        record.qc_notes = notes.clone();
    }
    record.push_note(edit.note());
    Ok(())
}

/// Outbound channel to the citizen
pub trait CitizenNotifier: Send + Sync {
    fn notify_flagged(&self, record: &SiteRecord);
}

/// Notifier that only logs
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl CitizenNotifier for TracingNotifier {
    fn notify_flagged(&self, record: &SiteRecord) {
        info!(
            sample_id = %record.sample_id,
            "Citizen notified: proof of installation requested"
        );
    }
}

/// Store-backed lifecycle operations
#[derive(Clone)]
pub struct AuditLifecycle {
    store: Arc<RecordStore>,
    uploads_dir: PathBuf,
    notifier: Arc<dyn CitizenNotifier>,
}

impl AuditLifecycle {
    pub fn new(store: Arc<RecordStore>, uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            uploads_dir: uploads_dir.into(),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CitizenNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Load, transition and save under the record's write lock
    pub fn perform(&self, sample_id: &str, actor: Actor, action: AuditAction) -> Result<SiteRecord> {
        let result = self
            .store
            .update(sample_id, |record| apply_action(record, actor, &action));

        match &result {
            Ok(record) => info!(
                sample_id = %sample_id,
                %actor,
                action = action.name(),
                status = %record.qc_status,
                "Lifecycle transition"
            ),
            Err(e) => warn!(
                sample_id = %sample_id,
                %actor,
                action = action.name(),
                error = %e,
                "Lifecycle transition refused"
            ),
        }
        result
    }

    pub fn flag_for_review(&self, sample_id: &str) -> Result<SiteRecord> {
        let record = self.perform(sample_id, Actor::Auditor, AuditAction::FlagForReview)?;
        self.notifier.notify_flagged(&record);
        Ok(record)
    }

    /// Persist the citizen's proof, then move the record to appeal review
    pub fn submit_appeal(&self, sample_id: &str, proof: &[u8]) -> Result<SiteRecord> {
        if proof.is_empty() {
            return Err(Error::InvalidInput("proof upload is empty".to_string()));
        }

        // refuse before writing anything if the appeal cannot apply
        let current = self.store.load(sample_id)?;
        let appeal = AuditAction::SubmitAppeal {
            proof: PathBuf::new(),
        };
        next_state(current.qc_status, Actor::Citizen, &appeal)?;

        let path = self.store_proof(sample_id, proof)?;
        self.perform(sample_id, Actor::Citizen, AuditAction::SubmitAppeal { proof: path })
    }

    pub fn accept_solar(&self, sample_id: &str, zone: Option<BufferZone>) -> Result<SiteRecord> {
        self.perform(sample_id, Actor::Auditor, AuditAction::AcceptSolar { zone })
    }

    pub fn verify_empty(&self, sample_id: &str) -> Result<SiteRecord> {
        self.perform(sample_id, Actor::Auditor, AuditAction::VerifyEmpty)
    }

    pub fn reject_evidence(&self, sample_id: &str) -> Result<SiteRecord> {
        self.perform(sample_id, Actor::Auditor, AuditAction::RejectEvidence)
    }

    pub fn unlock(&self, sample_id: &str) -> Result<SiteRecord> {
        self.perform(sample_id, Actor::Auditor, AuditAction::Unlock)
    }

    pub fn manual_override(&self, sample_id: &str, edit: &ManualOverride) -> Result<SiteRecord> {
        let record = self
            .store
            .update(sample_id, |record| apply_override(record, edit))?;
        info!(
            sample_id = %sample_id,
            verdict = ?edit.verdict,
            status = %record.qc_status,
            "Manual override applied"
        );
        Ok(record)
    }

    fn store_proof(&self, sample_id: &str, proof: &[u8]) -> Result<PathBuf> {
        let ext = image::guess_format(proof)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("bin");

        fs::create_dir_all(&self.uploads_dir)?;
        let path = proof_path(&self.uploads_dir, sample_id, ext);
        fs::write(&path, proof)?;
        info!(sample_id = %sample_id, path = %path.display(), bytes = proof.len(), "Proof stored");
        Ok(path)
    }
}

fn proof_path(dir: &Path, sample_id: &str, ext: &str) -> PathBuf {
    dir.join(format!("{}_proof.{}", sample_id, ext))
}
