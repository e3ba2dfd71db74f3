//! Clip catalog: the ordered clips of a session and their rank options.
//!
//! The catalog is loaded from a human-editable text blob:
//!
//! ```text
//! # comments and blank lines are ignored
//! https://clips.example/first
//!     Gold | g, gold nova @ static/ranks/gold.png
//!     Silver Elite | se
//! https://clips.example/second
//!     Gold
//!     Silver
//! ```
//!
//! A line starting at column 0 opens a clip (its text is the clip url), an
//! indented line adds a rank option `Label [| alias, ...] [@ image]` to the
//! clip above it.

use crate::types::{RankIndex, COMMAND_MARKER};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Errors that can occur while loading a catalog
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("No clips were loaded")]
    Empty,

    #[error("Line {line}: rank option before the first clip")]
    RankBeforeClip { line: usize },

    #[error("Clip {clip} has no rank options")]
    ClipWithoutRanks { clip: String },

    #[error("Line {line}: rank option without a label")]
    EmptyLabel { line: usize },

    #[error("Clip {clip}: alias '{alias}' matches more than one rank")]
    AmbiguousAlias { clip: String, alias: String },

    #[error("Failed to access catalog file: {0}")]
    Io(#[from] std::io::Error),
}

/// One selectable outcome for a clip
#[derive(Debug, Clone, PartialEq)]
pub struct RankOption {
    pub label: String,
    /// Extra chat spellings, as written in the catalog
    pub aliases: Vec<String>,
    pub image: Option<PathBuf>,
}

impl RankOption {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            aliases: Vec::new(),
            image: None,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_image(mut self, image: impl Into<PathBuf>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Normalized lookup keys for a piece of chat text, in the order they are tried.
///
/// The text is lower-cased, leading command markers are removed, and inner
/// whitespace is either dropped (`silverelite`) or replaced with `_`
/// (`silver_elite`).
pub fn alias_keys(raw: &str) -> [String; 2] {
    let folded = raw.trim().to_lowercase();
    let folded = folded.trim_start_matches(COMMAND_MARKER);
    let words: Vec<&str> = folded.split_whitespace().collect();
    [words.concat(), words.join("_")]
}

/// An ordered catalog entry with its rank options
#[derive(Debug, Clone)]
pub struct Clip {
    url: String,
    ranks: Vec<RankOption>,
    alias_index: HashMap<String, RankIndex>,
}

impl Clip {
    /// Build a clip, indexing every alias of every rank.
    ///
    /// Fails if the clip has no ranks or if one alias key would select two
    /// different ranks.
    pub fn new(url: impl Into<String>, ranks: Vec<RankOption>) -> Result<Self, LoadError> {
        let url = url.into();
        if ranks.is_empty() {
            return Err(LoadError::ClipWithoutRanks { clip: url });
        }

        let mut alias_index = HashMap::new();
        for (idx, rank) in ranks.iter().enumerate() {
            let spellings = std::iter::once(&rank.label).chain(rank.aliases.iter());
            for spelling in spellings {
                for key in alias_keys(spelling) {
                    if key.is_empty() {
                        continue;
                    }
                    match alias_index.insert(key.clone(), idx) {
                        Some(previous) if previous != idx => {
                            return Err(LoadError::AmbiguousAlias {
                                clip: url,
                                alias: key,
                            });
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(Self {
            url,
            ranks,
            alias_index,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ranks(&self) -> &[RankOption] {
        &self.ranks
    }

    pub fn rank(&self, idx: RankIndex) -> Option<&RankOption> {
        self.ranks.get(idx)
    }

    /// Match chat text or a host-supplied label against this clip's aliases
    pub fn find_rank(&self, raw: &str) -> Option<RankIndex> {
        alias_keys(raw)
            .iter()
            .find_map(|key| self.alias_index.get(key).copied())
    }
}

/// The full ordered sequence of clips
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    clips: Vec<Clip>,
}

impl Catalog {
    /// Build a catalog from already validated clips. Rejects an empty list.
    pub fn new(clips: Vec<Clip>) -> Result<Self, LoadError> {
        if clips.is_empty() {
            return Err(LoadError::Empty);
        }
        Ok(Self { clips })
    }

    /// Parse the catalog text format
    pub fn parse(blob: &str) -> Result<Self, LoadError> {
        let mut entries: Vec<(String, Vec<RankOption>)> = Vec::new();

        for (n, line) in blob.lines().enumerate() {
            let line_no = n + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if line.starts_with(char::is_whitespace) {
                let (_, ranks) = entries
                    .last_mut()
                    .ok_or(LoadError::RankBeforeClip { line: line_no })?;
                ranks.push(parse_rank(trimmed, line_no)?);
            } else {
                entries.push((trimmed.to_string(), Vec::new()));
            }
        }

        let clips = entries
            .into_iter()
            .map(|(url, ranks)| Clip::new(url, ranks))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(clips)
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn get(&self, idx: usize) -> Option<&Clip> {
        self.clips.get(idx)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

fn parse_rank(text: &str, line_no: usize) -> Result<RankOption, LoadError> {
    let (rest, image) = match text.split_once('@') {
        Some((rest, image)) => (rest, Some(image.trim()).filter(|i| !i.is_empty())),
        None => (text, None),
    };

    let (label, aliases) = match rest.split_once('|') {
        Some((label, aliases)) => (label.trim(), aliases),
        None => (rest.trim(), ""),
    };

    if label.is_empty() {
        return Err(LoadError::EmptyLabel { line: line_no });
    }

    Ok(RankOption {
        label: label.to_string(),
        aliases: aliases
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect(),
        image: image.map(PathBuf::from),
    })
}

/// Backing source of the catalog text
#[derive(Debug, Clone)]
pub struct CatalogStore {
    backing: Backing,
}

#[derive(Debug, Clone)]
enum Backing {
    File(PathBuf),
    Memory(Arc<RwLock<String>>),
}

impl CatalogStore {
    /// Catalog stored in a text file on disk
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    /// Catalog held in memory only
    pub fn memory(blob: impl Into<String>) -> Self {
        Self {
            backing: Backing::Memory(Arc::new(RwLock::new(blob.into()))),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    pub async fn read_blob(&self) -> Result<String, LoadError> {
        match &self.backing {
            Backing::File(path) => Ok(tokio::fs::read_to_string(path).await?),
            Backing::Memory(blob) => Ok(blob.read().await.clone()),
        }
    }

    /// Read and parse the stored catalog
    pub async fn load(&self) -> Result<Catalog, LoadError> {
        let blob = self.read_blob().await?;
        Catalog::parse(&blob)
    }

    /// Replace the stored catalog text
    pub async fn save(&self, blob: &str) -> Result<(), LoadError> {
        match &self.backing {
            Backing::File(path) => tokio::fs::write(path, blob).await?,
            Backing::Memory(stored) => *stored.write().await = blob.to_string(),
        }
        Ok(())
    }
}
