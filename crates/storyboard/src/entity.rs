use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Environment,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityImportance {
    Primary,
    Secondary,
    Background,
}

/// An entity (character or environment) automatically discovered during
/// source-video analysis. Created once per job, read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntity {
    pub id: String,
    pub kind: EntityKind,
    pub importance: EntityImportance,
    pub name: String,
    #[serde(default)]
    pub visual_signature: String,
    #[serde(default)]
    pub description: String,
    /// Shot indices the entity appears in.
    #[serde(default)]
    pub shot_indices: BTreeSet<usize>,
}

/// A user- or AI-declared override for a ledger entity. Any field may be
/// absent; an absent anchor means the entity is used as discovered.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IdentityAnchor {
    pub anchor_id: String,
    #[serde(default)]
    pub anchor_name: Option<String>,
    #[serde(default)]
    pub detailed_description: Option<String>,
    /// Ledger entity id this anchor overrides, when declared explicitly.
    #[serde(default)]
    pub original_placeholder: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub atmosphere: Option<String>,
}

/// State of one reference-image slot of a resolved entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewState {
    #[default]
    Empty,
    Uploaded,
    Generating,
    Ready,
}

/// Three-view reference image slots. Labels depend on the entity kind:
/// front/side/back for characters, wide/detail/alt for environments.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ViewSlots {
    pub slots: [ViewState; 3],
}

impl ViewSlots {
    pub fn labels(kind: EntityKind) -> [&'static str; 3] {
        match kind {
            EntityKind::Character => ["front", "side", "back"],
            EntityKind::Environment => ["wide", "detail", "alt"],
        }
    }

    pub fn all_ready(&self) -> bool {
        self.slots.iter().all(|s| *s == ViewState::Ready)
    }

    pub fn set_all(&mut self, state: ViewState) {
        for slot in &mut self.slots {
            *slot = state.clone();
        }
    }
}

/// The merged working record the rest of the pipeline consumes: a ledger
/// entity combined with its (possibly absent) identity anchor. Identity
/// fields are fixed once resolution completes; only the view slots mutate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEntity {
    /// Anchor id if an anchor matched, else the ledger id.
    pub id: String,
    pub kind: EntityKind,
    pub name: String,
    pub description: String,
    /// Ledger id this record was resolved from.
    pub ledger_id: String,
    /// Anchor id that matched, if any.
    #[serde(default)]
    pub anchor_id: Option<String>,
    #[serde(default)]
    pub views: ViewSlots,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_labels_follow_kind() {
        assert_eq!(
            ViewSlots::labels(EntityKind::Character),
            ["front", "side", "back"]
        );
        assert_eq!(
            ViewSlots::labels(EntityKind::Environment),
            ["wide", "detail", "alt"]
        );
    }

    #[test]
    fn view_slots_report_readiness() {
        let mut views = ViewSlots::default();
        assert!(!views.all_ready());
        views.slots[0] = ViewState::Ready;
        views.slots[1] = ViewState::Ready;
        assert!(!views.all_ready());
        views.slots[2] = ViewState::Ready;
        assert!(views.all_ready());
    }

    #[test]
    fn anchor_deserializes_with_missing_fields() {
        let anchor: IdentityAnchor =
            serde_json::from_str(r#"{"anchorId":"a1","anchorName":"Captain"}"#).unwrap();
        assert_eq!(anchor.anchor_id, "a1");
        assert_eq!(anchor.anchor_name.as_deref(), Some("Captain"));
        assert!(anchor.original_placeholder.is_none());
        assert!(anchor.style.is_none());
    }
}
