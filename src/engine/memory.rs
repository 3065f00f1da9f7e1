//! Per-entity rolling memory, rebuilt from the response history after every round.

use std::collections::BTreeMap;

use crate::domain::{EntityResponse, EntityRoundMemory};

/// Rebuild every entity's memory from the full response history.
///
/// Pure: the output depends only on `history`. Responses are folded in round
/// order, so the history may arrive in any order within a round.
pub fn build_entity_memory(history: &[EntityResponse]) -> BTreeMap<String, EntityRoundMemory> {
    let mut ordered: Vec<&EntityResponse> = history.iter().collect();
    ordered.sort_by_key(|r| r.round_number);

    let mut memory: BTreeMap<String, EntityRoundMemory> = BTreeMap::new();
    for response in ordered {
        memory
            .entry(response.entity_id.clone())
            .or_insert_with(|| EntityRoundMemory {
                entity_id: response.entity_id.clone(),
                ..Default::default()
            })
            .absorb(response);
    }

    for entry in memory.values_mut() {
        entry.rounds_participated.sort_unstable();
    }
    memory
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PredictedReaction, ResponseDecision, MAX_REMEMBERED_CLAIMS};
    use proptest::prelude::*;

    fn response(entity: &str, round: u32, decision: ResponseDecision, claims: &[&str]) -> EntityResponse {
        EntityResponse {
            entity_id: entity.into(),
            entity_name: entity.to_uppercase(),
            round_number: round,
            response_decision: decision,
            position_summary: format!("{entity} round {round}"),
            key_claims: claims.iter().map(|c| c.to_string()).collect(),
            themes_championed: vec!["pricing".into()],
            predicted_reactions: vec![PredictedReaction {
                entity_id: "other".into(),
                predicted_response: "objects".into(),
                confidence: 0.7,
            }],
        }
    }

    #[test]
    fn test_memory_tracks_history() {
        let history = vec![
            response("e1", 1, ResponseDecision::Support, &["a", "b"]),
            response("e2", 1, ResponseDecision::Oppose, &["x"]),
            response("e1", 2, ResponseDecision::Conditional, &["a", "c"]),
        ];
        let memory = build_entity_memory(&history);

        let e1 = &memory["e1"];
        assert_eq!(e1.rounds_participated, vec![1, 2]);
        assert_eq!(e1.latest_position, "e1 round 2");
        assert_eq!(e1.claims, vec!["b", "a", "c"]);
        assert_eq!(e1.themes, vec!["pricing"]);
        assert_eq!(e1.predictions_made, 2);
        assert_eq!(e1.latest_decision(), Some(ResponseDecision::Conditional));
        assert!(e1.shifted_position());

        let e2 = &memory["e2"];
        assert_eq!(e2.rounds_participated, vec![1]);
        assert!(!e2.shifted_position());
    }

    #[test]
    fn test_out_of_order_history_folds_by_round() {
        let history = vec![
            response("e1", 2, ResponseDecision::Oppose, &[]),
            response("e1", 1, ResponseDecision::Support, &[]),
        ];
        let memory = build_entity_memory(&history);
        assert_eq!(memory["e1"].latest_position, "e1 round 2");
        assert_eq!(memory["e1"].latest_decision(), Some(ResponseDecision::Oppose));
    }

    #[test]
    fn test_claims_capped() {
        let claims: Vec<String> = (0..15).map(|i| format!("claim {i}")).collect();
        let refs: Vec<&str> = claims.iter().map(String::as_str).collect();
        let memory = build_entity_memory(&[response("e1", 1, ResponseDecision::Support, &refs)]);
        assert_eq!(memory["e1"].claims.len(), MAX_REMEMBERED_CLAIMS);
        assert_eq!(memory["e1"].claims[0], "claim 5");
    }

    #[test]
    fn test_empty_history() {
        assert!(build_entity_memory(&[]).is_empty());
    }

    fn arb_response() -> impl Strategy<Value = EntityResponse> {
        (
            "e[0-3]",
            1u32..5,
            prop::sample::select(vec![
                ResponseDecision::Support,
                ResponseDecision::Oppose,
                ResponseDecision::Neutral,
            ]),
            prop::collection::vec("[a-d]", 0..4),
        )
            .prop_map(|(entity, round, decision, claims)| {
                let refs: Vec<&str> = claims.iter().map(String::as_str).collect();
                response(&entity, round, decision, &refs)
            })
    }

    proptest! {
        #[test]
        fn prop_rebuild_is_idempotent(history in prop::collection::vec(arb_response(), 0..20)) {
            let first = build_entity_memory(&history);
            let second = build_entity_memory(&history);
            prop_assert_eq!(&first, &second);
            for memory in first.values() {
                prop_assert!(memory.claims.len() <= MAX_REMEMBERED_CLAIMS);
            }
        }
    }
}
