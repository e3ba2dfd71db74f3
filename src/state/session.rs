use super::tally::VoteTally;
use super::SessionError;
use crate::catalog::{Catalog, Clip, LoadError};
use crate::types::{ClipIndex, Phase, RankIndex, SessionId};
use std::sync::Arc;

/// Outcome of advancing the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// A clip entered the voting phase
    Started(ClipIndex),
    /// The last clip was done, the session is back to idle
    Finished,
}

/// The live voting session: catalog position, phase and current tally.
///
/// Invariants:
/// - `Voting` holds an unfrozen tally for the current clip
/// - `Results` holds a frozen tally with a host choice
/// - `Idle` holds no tally and no current clip
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    catalog: Arc<Catalog>,
    clip_idx: Option<ClipIndex>,
    phase: Phase,
    tally: Option<VoteTally>,
}

impl Session {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            catalog,
            clip_idx: None,
            phase: Phase::Idle,
            tally: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Index of the clip in play, `None` before the first clip
    pub fn clip_idx(&self) -> Option<ClipIndex> {
        self.clip_idx
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn tally(&self) -> Option<&VoteTally> {
        self.tally.as_ref()
    }

    pub fn current_clip(&self) -> Option<&Clip> {
        self.clip_idx.and_then(|idx| self.catalog.get(idx))
    }

    /// Whether `advance` would start another clip
    pub fn has_next(&self) -> bool {
        match self.clip_idx {
            None => !self.catalog.is_empty(),
            Some(idx) => idx + 1 < self.catalog.len(),
        }
    }

    /// Clips after the current one that have not been played yet
    pub fn remaining(&self) -> usize {
        match self.clip_idx {
            None => self.catalog.len(),
            Some(idx) => self.catalog.len().saturating_sub(idx + 1),
        }
    }

    /// Number of distinct viewers who voted on the current clip
    pub fn total(&self) -> usize {
        self.tally.as_ref().map_or(0, VoteTally::total)
    }

    /// Fails with `StaleClip` unless the clip in play is `expected`
    pub fn expect_clip(&self, expected: Option<ClipIndex>) -> Result<(), SessionError> {
        if self.clip_idx == expected {
            Ok(())
        } else {
            Err(SessionError::StaleClip {
                expected,
                current: self.clip_idx,
            })
        }
    }

    /// Move to the next clip, or back to idle after the last one
    pub fn advance(&mut self) -> Result<Advance, SessionError> {
        match self.phase {
            Phase::Idle => {
                if self.catalog.is_empty() {
                    return Err(SessionError::Load(LoadError::Empty));
                }
                self.start_clip(0);
                Ok(Advance::Started(0))
            }
            Phase::Voting => Err(SessionError::InvalidPhase {
                action: "advance",
                phase: self.phase,
            }),
            Phase::Results => {
                let next = self.clip_idx.map_or(0, |idx| idx + 1);
                if next < self.catalog.len() {
                    self.start_clip(next);
                    Ok(Advance::Started(next))
                } else {
                    self.reset();
                    Ok(Advance::Finished)
                }
            }
        }
    }

    /// Record a viewer vote. No-op outside of `Voting`.
    pub fn cast_viewer_vote(&mut self, viewer_id: &str, raw_text: &str) -> bool {
        if self.phase != Phase::Voting {
            return false;
        }

        let clip = self.clip_idx.and_then(|idx| self.catalog.get(idx));
        match (self.tally.as_mut(), clip) {
            (Some(tally), Some(clip)) => tally.cast_viewer_vote(clip, viewer_id, raw_text),
            _ => false,
        }
    }

    /// Freeze the current clip with the host's choice and show results
    pub fn finalize(&mut self, host_choice: &str) -> Result<RankIndex, SessionError> {
        match self.phase {
            Phase::Voting => {}
            Phase::Results => return Err(SessionError::AlreadyFinalized),
            Phase::Idle => {
                return Err(SessionError::InvalidPhase {
                    action: "finalize",
                    phase: self.phase,
                })
            }
        }

        let clip = self.clip_idx.and_then(|idx| self.catalog.get(idx));
        let (Some(tally), Some(clip)) = (self.tally.as_mut(), clip) else {
            return Err(SessionError::InvalidPhase {
                action: "finalize",
                phase: self.phase,
            });
        };

        let rank = clip
            .find_rank(host_choice)
            .ok_or_else(|| SessionError::UnknownRank(host_choice.to_string()))?;

        tally.finalize(rank)?;
        self.phase = Phase::Results;
        Ok(rank)
    }

    /// Replace the catalog. Only allowed while idle.
    pub fn reload_catalog(&mut self, catalog: Catalog) -> Result<(), SessionError> {
        if self.phase != Phase::Idle {
            return Err(SessionError::SessionBusy);
        }
        self.catalog = Arc::new(catalog);
        Ok(())
    }

    fn start_clip(&mut self, idx: ClipIndex) {
        // Caller checked idx against the catalog
        if let Some(clip) = self.catalog.get(idx) {
            self.tally = Some(VoteTally::new(idx, clip));
            self.clip_idx = Some(idx);
            self.phase = Phase::Voting;
        }
    }

    fn reset(&mut self) {
        self.id = ulid::Ulid::new().to_string();
        self.clip_idx = None;
        self.tally = None;
        self.phase = Phase::Idle;
    }
}
