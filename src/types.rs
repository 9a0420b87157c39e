//! Core types and data structures for the vibe-mint creation flow.

use serde::{Deserialize, Serialize};

/// An EVM-style account or contract address (hex string, 0x-prefixed).
pub type Address = String;

/// Placeholder shown (and sent nowhere) when a coin carries no usable image.
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

/// Maximum number of coins a user can select at once.
pub const MAX_SELECTION: usize = 2;

/// Ranking criterion for the market gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankCriterion {
    /// Top coins by 24h trading volume
    Volume24h,
    /// Top coins by 24h price gain
    Gainers,
}

/// One tradable coin surfaced in the gallery.
///
/// Immutable once fetched; a re-fetch replaces records wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinRecord {
    /// Stable identifier (contract address plus chain qualifier)
    pub id: String,
    /// Display name
    pub name: Option<String>,
    /// Ticker symbol
    pub symbol: Option<String>,
    /// Resolved image URL, falling back to [`PLACEHOLDER_IMAGE`]
    pub image_url: Option<String>,
    /// 24h trading volume
    pub volume_24h: Option<f64>,
    /// Market capitalization
    pub market_cap: Option<f64>,
    /// Number of unique holders
    pub unique_holders: Option<f64>,
    /// 24h market cap change, in percent
    pub market_cap_delta_24h: Option<f64>,
}

impl CoinRecord {
    /// Image URL if it points at real content (not the placeholder).
    pub fn usable_image(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .filter(|url| !url.contains("placeholder"))
    }
}

/// Ordered set of at most [`MAX_SELECTION`] coin ids chosen by the user.
///
/// Order matters for display indexing only. Adding beyond the cap or
/// adding a duplicate is a no-op, as is removing a non-member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: Vec<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a coin id. Returns false when the id is already present or
    /// the selection is full.
    pub fn add(&mut self, id: &str) -> bool {
        if self.ids.len() >= MAX_SELECTION || self.contains(id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    /// Remove a coin id. Returns false when the id was not selected.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() != before
    }

    /// Flip membership of an id (gallery click semantics). Returns true
    /// when the id is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.contains(id) {
            self.remove(id);
            false
        } else {
            self.add(id)
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    /// Display index of an id (0-based position in selection order).
    pub fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|existing| existing == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop the whole selection (invoked after a completed mint).
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Resolve the selected ids against a coin list, preserving order.
    pub fn resolve<'a>(&self, coins: &'a [CoinRecord]) -> Vec<&'a CoinRecord> {
        self.ids
            .iter()
            .filter_map(|id| coins.iter().find(|coin| &coin.id == id))
            .collect()
    }
}

/// A prepared contract invocation, consumed opaquely by the wallet's
/// write capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCall {
    /// Target contract address
    pub address: Address,
    /// Function name
    pub function: String,
    /// Positional arguments, pre-encoded as strings
    pub args: Vec<String>,
}
