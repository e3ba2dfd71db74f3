use super::SessionError;
use crate::catalog::Clip;
use crate::types::{ClipIndex, RankIndex, ViewerId};
use std::collections::HashMap;

/// Vote counting for the clip currently in play.
///
/// Holds at most one choice per viewer. Once the host choice is set the
/// tally is frozen and ignores further viewer votes.
#[derive(Debug, Clone)]
pub struct VoteTally {
    clip_idx: ClipIndex,
    rank_count: usize,
    votes: HashMap<ViewerId, RankIndex>,
    host_choice: Option<RankIndex>,
}

impl VoteTally {
    pub fn new(clip_idx: ClipIndex, clip: &Clip) -> Self {
        Self {
            clip_idx,
            rank_count: clip.ranks().len(),
            votes: HashMap::new(),
            host_choice: None,
        }
    }

    pub fn clip_idx(&self) -> ClipIndex {
        self.clip_idx
    }

    /// Record a viewer's vote from raw chat text.
    ///
    /// Returns true only when the stored choice changed (first vote from this
    /// viewer, or a different rank than before).
    pub fn cast_viewer_vote(&mut self, clip: &Clip, viewer_id: &str, raw_text: &str) -> bool {
        if self.is_frozen() {
            return false;
        }

        let Some(rank) = clip.find_rank(raw_text) else {
            return false;
        };

        match self.votes.insert(viewer_id.to_string(), rank) {
            Some(previous) => previous != rank,
            None => true,
        }
    }

    /// Record the host's final choice and freeze the tally
    pub fn finalize(&mut self, host_choice: RankIndex) -> Result<(), SessionError> {
        if self.host_choice.is_some() {
            return Err(SessionError::AlreadyFinalized);
        }
        self.host_choice = Some(host_choice);
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.host_choice.is_some()
    }

    pub fn host_choice(&self) -> Option<RankIndex> {
        self.host_choice
    }

    /// Number of distinct viewers who voted
    pub fn total(&self) -> usize {
        self.votes.len()
    }

    pub fn choice_of(&self, viewer_id: &str) -> Option<RankIndex> {
        self.votes.get(viewer_id).copied()
    }

    /// Votes per rank, in catalog order
    pub fn counts(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.rank_count];
        for &rank in self.votes.values() {
            if let Some(count) = counts.get_mut(rank) {
                *count += 1;
            }
        }
        counts
    }
}
