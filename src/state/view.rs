//! Read-only snapshots of the session for displays and the host panel

use super::session::Session;
use crate::catalog::alias_keys;
use crate::types::{ClipIndex, Phase, SessionId};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// Everything but unreserved URL characters gets escaped in a path segment
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankView {
    pub label: String,
    pub votes: u32,
    /// Where the rank image is served from (placeholder if none is configured)
    pub image_url: String,
    pub is_host_choice: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipView {
    pub url: String,
    pub ranks: Vec<RankView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionView {
    pub session_id: SessionId,
    pub phase: Phase,
    pub clip_idx: Option<ClipIndex>,
    pub clip_count: usize,
    pub remaining: usize,
    pub has_next: bool,
    pub clip: Option<ClipView>,
    pub host_choice: Option<String>,
    pub total: usize,
}

/// Path segment used to address a rank image, percent-encoded
pub fn rank_slug(label: &str) -> String {
    let [_, underscored] = alias_keys(label);
    utf8_percent_encode(&underscored, SEGMENT).to_string()
}

impl Session {
    pub fn view(&self) -> SessionView {
        let tally = self.tally();
        let counts = tally.map(|t| t.counts()).unwrap_or_default();
        let host_choice = tally.and_then(|t| t.host_choice());

        let clip = self.current_clip().map(|clip| ClipView {
            url: clip.url().to_string(),
            ranks: clip
                .ranks()
                .iter()
                .enumerate()
                .map(|(idx, rank)| RankView {
                    label: rank.label.clone(),
                    votes: counts.get(idx).copied().unwrap_or(0),
                    image_url: format!("/rank/{}", rank_slug(&rank.label)),
                    is_host_choice: host_choice == Some(idx),
                })
                .collect(),
        });

        let host_choice_label = self
            .current_clip()
            .zip(host_choice)
            .and_then(|(clip, idx)| clip.rank(idx))
            .map(|rank| rank.label.clone());

        SessionView {
            session_id: self.id().to_string(),
            phase: self.phase(),
            clip_idx: self.clip_idx(),
            clip_count: self.catalog().len(),
            remaining: self.remaining(),
            has_next: self.has_next(),
            clip,
            host_choice: host_choice_label,
            total: self.total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use std::sync::Arc;

    #[test]
    fn test_idle_view_has_no_clip() {
        let catalog = Catalog::parse("https://clips.example/a\n  gold\n").unwrap();
        let view = Session::new(Arc::new(catalog)).view();

        assert_eq!(view.phase, Phase::Idle);
        assert_eq!(view.clip_idx, None);
        assert!(view.clip.is_none());
        assert_eq!(view.clip_count, 1);
        assert!(view.has_next);
        assert_eq!(view.total, 0);
    }

    #[test]
    fn test_results_view_marks_host_choice() {
        let catalog =
            Catalog::parse("https://clips.example/a\n  Gold Nova\n  Silver Elite\n").unwrap();
        let mut session = Session::new(Arc::new(catalog));
        session.advance().unwrap();
        session.cast_viewer_vote("u1", "!gold nova");
        session.cast_viewer_vote("u2", "!goldnova");
        session.cast_viewer_vote("u3", "!silverelite");
        session.finalize("silver elite").unwrap();

        let view = session.view();
        assert_eq!(view.phase, Phase::Results);
        assert_eq!(view.total, 3);
        assert_eq!(view.host_choice, Some("Silver Elite".to_string()));

        let clip = view.clip.unwrap();
        assert_eq!(clip.ranks[0].votes, 2);
        assert_eq!(clip.ranks[1].votes, 1);
        assert!(!clip.ranks[0].is_host_choice);
        assert!(clip.ranks[1].is_host_choice);
        assert_eq!(clip.ranks[1].image_url, "/rank/silver_elite");
    }

    #[test]
    fn test_rank_slug_is_url_safe() {
        assert_eq!(rank_slug("Gold Nova"), "gold_nova");
        assert_eq!(rank_slug("S/M #1?"), "s%2Fm_%231%3F");
        assert_eq!(rank_slug("Légende"), "l%C3%A9gende");
    }
}
