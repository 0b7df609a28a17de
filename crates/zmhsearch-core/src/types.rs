//! Filter masks, status tri-states, and sort modes shared by the planner
//! and evaluator.

use serde::{Deserialize, Serialize};

/// Separator code point used when several authors/aliases are pooled into
/// one string (U+001F, unit separator).
pub const LIST_SEP: char = '\u{1F}';

/// Number of tag bit slots available in the on-disk bitset.
pub const MAX_TAG_BITS: u8 = 50;

/// Bit positions within the per-doc status byte.
pub mod flag_bits {
    /// Document is hidden from listings.
    pub const HIDDEN: u8 = 1 << 0;
    /// Chapter list is hidden.
    pub const HIDE_CHAPTER: u8 = 1 << 1;
    /// Reading requires login.
    pub const NEED_LOGIN: u8 = 1 << 2;
    /// Document is locked.
    pub const LOCKED: u8 = 1 << 3;
}

/// A 64-bit tag bitset split into the on-disk `lo`/`hi` halves.
///
/// Bits 0..31 live in `lo`, bits 32..49 in `hi`. The same type expresses
/// both a document's tag set and a query-side mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMask {
    /// Bits 0..31.
    pub lo: u32,
    /// Bits 32..49.
    pub hi: u32,
}

impl TagMask {
    /// Build a mask from a list of tag bit slots. Slots at or above
    /// [`MAX_TAG_BITS`] are ignored.
    #[must_use]
    pub fn from_bits(bits: &[u8]) -> Self {
        let mut mask = Self::default();
        for &bit in bits {
            if bit >= MAX_TAG_BITS {
                continue;
            }
            if bit < 32 {
                mask.lo |= 1 << bit;
            } else {
                mask.hi |= 1 << (bit - 32);
            }
        }
        mask
    }

    /// Whether no bits are set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lo == 0 && self.hi == 0
    }

    /// All-selected-tags-present test: every bit of `self` is set in the
    /// doc's `(lo, hi)`.
    #[must_use]
    pub const fn all_present_in(&self, doc_lo: u32, doc_hi: u32) -> bool {
        (doc_lo & self.lo) == self.lo && (doc_hi & self.hi) == self.hi
    }

    /// No-excluded-tag-present test: no bit of `self` is set in the doc's
    /// `(lo, hi)`.
    #[must_use]
    pub const fn none_present_in(&self, doc_lo: u32, doc_hi: u32) -> bool {
        (doc_lo & self.lo) == 0 && (doc_hi & self.hi) == 0
    }
}

/// Tri-state predicate over one status bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tri {
    /// Bit value does not matter.
    #[default]
    Any,
    /// Bit must be clear.
    Zero,
    /// Bit must be set.
    One,
}

impl Tri {
    /// Whether a bit value satisfies this predicate.
    #[must_use]
    pub const fn accepts(self, set: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Zero => !set,
            Self::One => set,
        }
    }

    /// Single-char key fragment for the canonical plan string.
    #[must_use]
    pub const fn key_char(self) -> char {
        match self {
            Self::Any => 'a',
            Self::Zero => '0',
            Self::One => '1',
        }
    }
}

/// Tri-state filters over the four status bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFilters {
    /// Filter on the hidden bit.
    pub hidden: Tri,
    /// Filter on the chapter-hidden bit.
    pub hide_chapter: Tri,
    /// Filter on the need-login bit.
    pub need_login: Tri,
    /// Filter on the locked bit.
    pub locked: Tri,
}

impl StatusFilters {
    /// Whether a status byte passes all four predicates.
    #[must_use]
    pub const fn accepts(&self, flags: u8) -> bool {
        self.hidden.accepts(flags & flag_bits::HIDDEN != 0)
            && self.hide_chapter.accepts(flags & flag_bits::HIDE_CHAPTER != 0)
            && self.need_login.accepts(flags & flag_bits::NEED_LOGIN != 0)
            && self.locked.accepts(flags & flag_bits::LOCKED != 0)
    }

    /// True when every predicate is `Any` (the filter selects everything).
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        matches!(
            (self.hidden, self.hide_chapter, self.need_login, self.locked),
            (Tri::Any, Tri::Any, Tri::Any, Tri::Any)
        )
    }

    /// Four-char fragment for the canonical plan string.
    #[must_use]
    pub fn key_fragment(&self) -> String {
        [
            self.hidden.key_char(),
            self.hide_chapter.key_char(),
            self.need_login.key_char(),
            self.locked.key_char(),
        ]
        .iter()
        .collect()
    }
}

/// Result ordering requested by the query plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Descending relevance score, ties broken by newer publication id.
    #[default]
    Relevance,
    /// Descending publication id (newest first).
    IdDesc,
    /// Ascending publication id (oldest first).
    IdAsc,
}

impl SortMode {
    /// Stable token for the canonical plan string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::IdDesc => "id_desc",
            Self::IdAsc => "id_asc",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_mask_from_bits_splits_halves() {
        let mask = TagMask::from_bits(&[0, 3, 32, 49]);
        assert_eq!(mask.lo, 0b1001);
        assert_eq!(mask.hi, (1 << 0) | (1 << 17));
    }

    #[test]
    fn tag_mask_ignores_out_of_range_bits() {
        let mask = TagMask::from_bits(&[50, 63, 200]);
        assert!(mask.is_empty());
    }

    #[test]
    fn all_present_requires_every_selected_bit() {
        let selected = TagMask::from_bits(&[1, 33]);
        assert!(selected.all_present_in(0b10, 1 << 1));
        assert!(!selected.all_present_in(0b10, 0));
        assert!(!selected.all_present_in(0, 1 << 1));
    }

    #[test]
    fn none_present_rejects_any_overlap() {
        let excluded = TagMask::from_bits(&[2]);
        assert!(excluded.none_present_in(0b001, 0xFFFF));
        assert!(!excluded.none_present_in(0b100, 0));
    }

    #[test]
    fn tri_accepts() {
        assert!(Tri::Any.accepts(true) && Tri::Any.accepts(false));
        assert!(Tri::Zero.accepts(false) && !Tri::Zero.accepts(true));
        assert!(Tri::One.accepts(true) && !Tri::One.accepts(false));
    }

    #[test]
    fn status_filters_identity_accepts_everything() {
        let filters = StatusFilters::default();
        assert!(filters.is_identity());
        for flags in 0..16u8 {
            assert!(filters.accepts(flags));
        }
    }

    #[test]
    fn status_filters_select_bit() {
        let filters = StatusFilters {
            hidden: Tri::Zero,
            locked: Tri::One,
            ..StatusFilters::default()
        };
        assert!(!filters.is_identity());
        assert!(filters.accepts(flag_bits::LOCKED));
        assert!(!filters.accepts(flag_bits::LOCKED | flag_bits::HIDDEN));
        assert!(!filters.accepts(0));
    }

    #[test]
    fn status_key_fragment_is_stable() {
        let filters = StatusFilters {
            hidden: Tri::Zero,
            hide_chapter: Tri::Any,
            need_login: Tri::One,
            locked: Tri::Any,
        };
        assert_eq!(filters.key_fragment(), "0a1a");
    }

    #[test]
    fn sort_mode_serde_tokens() {
        let json = serde_json::to_string(&SortMode::IdDesc).unwrap();
        assert_eq!(json, "\"id_desc\"");
        let mode: SortMode = serde_json::from_str("\"relevance\"").unwrap();
        assert_eq!(mode, SortMode::Relevance);
        assert_eq!(SortMode::IdAsc.as_str(), "id_asc");
    }
}
