//! Per-entity memory carried from round to round.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::response::{EntityResponse, ResponseDecision};

/// Most recent claims an entity carries forward.
pub const MAX_REMEMBERED_CLAIMS: usize = 10;

/// Digest of one entity's own prior responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRoundMemory {
    /// Entity id
    pub entity_id: String,
    /// Rounds this entity responded in, ascending
    pub rounds_participated: Vec<u32>,
    /// Decision taken in each participated round
    pub decisions: BTreeMap<u32, ResponseDecision>,
    /// Position summary from the latest participated round
    pub latest_position: String,
    /// Claims made, deduplicated, most recent last
    pub claims: Vec<String>,
    /// Themes championed, deduplicated, first-seen order
    pub themes: Vec<String>,
    /// Total predicted reactions issued
    pub predictions_made: usize,
}

impl EntityRoundMemory {
    /// Decision from the latest participated round
    pub fn latest_decision(&self) -> Option<ResponseDecision> {
        self.decisions.values().next_back().copied()
    }

    /// Whether the decision changed between the last two participated rounds
    pub fn shifted_position(&self) -> bool {
        let mut recent = self.decisions.values().rev();
        match (recent.next(), recent.next()) {
            (Some(last), Some(prev)) => last != prev,
            _ => false,
        }
    }

    /// Fold one response into the memory.
    pub(crate) fn absorb(&mut self, response: &EntityResponse) {
        if !self.rounds_participated.contains(&response.round_number) {
            self.rounds_participated.push(response.round_number);
        }
        self.decisions
            .insert(response.round_number, response.response_decision);
        self.latest_position = response.position_summary.clone();

        for claim in &response.key_claims {
            // re-stating a claim moves it to the recent end
            self.claims.retain(|c| c != claim);
            self.claims.push(claim.clone());
        }
        if self.claims.len() > MAX_REMEMBERED_CLAIMS {
            let excess = self.claims.len() - MAX_REMEMBERED_CLAIMS;
            self.claims.drain(..excess);
        }

        for theme in &response.themes_championed {
            if !self.themes.contains(theme) {
                self.themes.push(theme.clone());
            }
        }
        self.predictions_made += response.predicted_reactions.len();
    }
}
