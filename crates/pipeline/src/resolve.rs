/// Entity resolution: merge the discovered ledger with the declared anchor
/// set into one working record per ledger entity.
///
/// The ledger is authoritative for completeness (every entity that appears in
/// the video is represented), anchors for user intent (renames,
/// replacements). Neither source is dropped; an entity with no anchor still
/// surfaces so it can be handled downstream.
use storyboard::{IdentityAnchor, LedgerEntity, ResolvedEntity, ViewSlots};

/// Swappable name-matching strategy, kept as a pure function so the rule can
/// be replaced (e.g. with edit-distance matching) without touching the
/// orchestrator.
pub type NameMatcher = fn(&str, &str) -> bool;

/// Default rule: case-folded containment in either direction, or equality.
pub fn names_overlap(anchor_name: &str, ledger_name: &str) -> bool {
    let a = anchor_name.trim().to_lowercase();
    let l = ledger_name.trim().to_lowercase();
    if a.is_empty() || l.is_empty() {
        return false;
    }
    a == l || a.contains(&l) || l.contains(&a)
}

/// Resolve one kind's ledger against its anchors. Pure and deterministic;
/// returns exactly one record per ledger entity, in ledger order.
pub fn resolve(ledger: &[LedgerEntity], anchors: &[IdentityAnchor]) -> Vec<ResolvedEntity> {
    resolve_with(ledger, anchors, names_overlap)
}

pub fn resolve_with(
    ledger: &[LedgerEntity],
    anchors: &[IdentityAnchor],
    matcher: NameMatcher,
) -> Vec<ResolvedEntity> {
    ledger
        .iter()
        .map(|entity| {
            let anchor = match_anchor(entity, anchors, matcher);
            compose(entity, anchor)
        })
        .collect()
}

/// Two-pass matching, first match wins: exact placeholder reference, then
/// name containment in anchor input order.
fn match_anchor<'a>(
    entity: &LedgerEntity,
    anchors: &'a [IdentityAnchor],
    matcher: NameMatcher,
) -> Option<&'a IdentityAnchor> {
    if let Some(anchor) = anchors
        .iter()
        .find(|a| a.original_placeholder.as_deref() == Some(entity.id.as_str()))
    {
        return Some(anchor);
    }
    let mut by_name = anchors.iter().filter(|a| {
        a.anchor_name
            .as_deref()
            .map(|name| matcher(name, &entity.name))
            .unwrap_or(false)
    });
    let chosen = by_name.next();
    if let (Some(first), Some(second)) = (chosen, by_name.next()) {
        // Deterministic but arbitrary tie-break: first anchor in input order.
        log::debug!(
            "ambiguous name match for ledger entity '{}': keeping anchor '{}', ignoring '{}'",
            entity.id,
            first.anchor_id,
            second.anchor_id
        );
    }
    chosen
}

fn compose(entity: &LedgerEntity, anchor: Option<&IdentityAnchor>) -> ResolvedEntity {
    let base_description = |entity: &LedgerEntity| {
        if !entity.description.is_empty() {
            entity.description.clone()
        } else {
            entity.visual_signature.clone()
        }
    };

    let (id, name, mut description, anchor_id) = match anchor {
        Some(anchor) => (
            anchor.anchor_id.clone(),
            anchor
                .anchor_name
                .clone()
                .unwrap_or_else(|| entity.name.clone()),
            anchor
                .detailed_description
                .clone()
                .unwrap_or_else(|| base_description(entity)),
            Some(anchor.anchor_id.clone()),
        ),
        None => (
            entity.id.clone(),
            entity.name.clone(),
            base_description(entity),
            None,
        ),
    };

    // Style and atmosphere modifiers append as labeled paragraphs, in that
    // fixed order.
    if let Some(anchor) = anchor {
        if let Some(style) = anchor.style.as_deref().filter(|s| !s.trim().is_empty()) {
            description.push_str(&format!("\n\nStyle: {style}"));
        }
        if let Some(atmosphere) = anchor
            .atmosphere
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            description.push_str(&format!("\n\nAtmosphere: {atmosphere}"));
        }
    }

    ResolvedEntity {
        id,
        kind: entity.kind,
        name,
        description,
        ledger_id: entity.id.clone(),
        anchor_id,
        views: ViewSlots::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyboard::{EntityImportance, EntityKind};

    fn entity(id: &str, name: &str) -> LedgerEntity {
        LedgerEntity {
            id: id.to_string(),
            kind: EntityKind::Character,
            importance: EntityImportance::Primary,
            name: name.to_string(),
            visual_signature: format!("{name} in a grey coat"),
            description: format!("{name}, weathered and quiet"),
            shot_indices: [0, 3].into_iter().collect(),
        }
    }

    fn anchor(id: &str, name: Option<&str>, placeholder: Option<&str>) -> IdentityAnchor {
        IdentityAnchor {
            anchor_id: id.to_string(),
            anchor_name: name.map(str::to_string),
            original_placeholder: placeholder.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn every_ledger_entity_is_kept() {
        let ledger = vec![
            entity("orig_char_01", "Father"),
            entity("orig_char_02", "Daughter"),
            entity("orig_char_03", "Stranger"),
        ];
        let anchors = vec![anchor("a1", Some("Father"), None)];
        let resolved = resolve(&ledger, &anchors);
        assert_eq!(resolved.len(), ledger.len());
        // And without anchors too.
        assert_eq!(resolve(&ledger, &[]).len(), ledger.len());
    }

    #[test]
    fn no_anchors_resolves_to_ledger_fields_exactly() {
        let ledger = vec![entity("orig_char_01", "Father")];
        let resolved = resolve(&ledger, &[]);
        assert_eq!(resolved[0].id, "orig_char_01");
        assert_eq!(resolved[0].name, "Father");
        assert_eq!(resolved[0].description, "Father, weathered and quiet");
        assert!(resolved[0].anchor_id.is_none());
    }

    #[test]
    fn placeholder_match_beats_name_overlap() {
        let ledger = vec![entity("orig_char_01", "Father")];
        let anchors = vec![
            anchor("a_name", Some("Father"), None),
            anchor("a_placeholder", Some("Captain"), Some("orig_char_01")),
        ];
        let resolved = resolve(&ledger, &anchors);
        assert_eq!(resolved[0].id, "a_placeholder");
        assert_eq!(resolved[0].name, "Captain");
    }

    #[test]
    fn name_containment_matches_either_direction() {
        let ledger = vec![entity("orig_char_01", "Old Father Thames")];
        let anchors = vec![anchor("a1", Some("father"), None)];
        assert_eq!(resolve(&ledger, &anchors)[0].id, "a1");

        let ledger = vec![entity("orig_char_02", "Ash")];
        let anchors = vec![anchor("a2", Some("Ash the Wanderer"), None)];
        assert_eq!(resolve(&ledger, &anchors)[0].id, "a2");
    }

    #[test]
    fn ambiguous_name_match_keeps_first_anchor_in_input_order() {
        let ledger = vec![entity("orig_char_01", "Father")];
        let anchors = vec![
            anchor("a_first", Some("Father"), None),
            anchor("a_second", Some("father"), None),
        ];
        let resolved = resolve(&ledger, &anchors);
        assert_eq!(resolved[0].id, "a_first");
    }

    #[test]
    fn anchor_description_and_modifiers_compose_in_fixed_order() {
        let ledger = vec![entity("orig_char_01", "Father")];
        let anchors = vec![IdentityAnchor {
            anchor_id: "a1".into(),
            anchor_name: Some("Captain".into()),
            detailed_description: Some("A retired sea captain".into()),
            original_placeholder: Some("orig_char_01".into()),
            style: Some("oil painting".into()),
            atmosphere: Some("storm-lit".into()),
        }];
        let resolved = resolve(&ledger, &anchors);
        assert_eq!(
            resolved[0].description,
            "A retired sea captain\n\nStyle: oil painting\n\nAtmosphere: storm-lit"
        );
    }

    #[test]
    fn missing_descriptions_fall_back_to_visual_signature() {
        let mut bare = entity("orig_env_01", "Harbor");
        bare.description = String::new();
        let resolved = resolve(&[bare], &[]);
        assert_eq!(resolved[0].description, "Harbor in a grey coat");
    }

    #[test]
    fn matcher_strategy_is_swappable() {
        let ledger = vec![entity("orig_char_01", "Father")];
        let anchors = vec![anchor("a1", Some("Father"), None)];
        let never: NameMatcher = |_, _| false;
        let resolved = resolve_with(&ledger, &anchors, never);
        assert!(resolved[0].anchor_id.is_none());
    }
}
