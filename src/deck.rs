//! Card themes, deck generation, and the triple-matching rule.
//!
//! Everything here is pure: deck generation is deterministic, shuffling
//! returns a fresh permutation without touching its input, and match
//! validation has no side effects.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Number of attribute slots every card carries.
pub const ATTRIBUTE_COUNT: usize = 4;

/// Immutable card: a stable identifier plus one value index per attribute slot.
///
/// The id is assigned once at deck generation and survives shuffles; board
/// logic always refers to cards by id, never by deck position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Unique sequence number, `0..deck_size`, stable across shuffles.
    pub id: u32,
    /// One index per attribute slot into the theme's value domain.
    pub properties: [u8; ATTRIBUTE_COUNT],
}

/// Value domain for a single attribute slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDomain {
    /// Human readable attribute name (e.g. "shape").
    pub name: String,
    /// Ordered legal values; `Card::properties` indexes into this list.
    pub values: Vec<String>,
}

/// Immutable catalog describing the attribute domains of one card set.
///
/// Exactly one theme is active per game session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    /// Stable theme identifier.
    pub id: String,
    /// One value domain per attribute slot.
    pub attributes: [AttributeDomain; ATTRIBUTE_COUNT],
}

impl Theme {
    /// Built-in shape/color/count/fill theme, three values per attribute.
    pub fn classic() -> Self {
        fn domain(name: &str, values: [&str; 3]) -> AttributeDomain {
            AttributeDomain {
                name: name.to_string(),
                values: values.iter().map(|value| value.to_string()).collect(),
            }
        }

        Self {
            id: "classic".to_string(),
            attributes: [
                domain("shape", ["oval", "diamond", "squiggle"]),
                domain("color", ["red", "green", "purple"]),
                domain("count", ["one", "two", "three"]),
                domain("fill", ["solid", "striped", "open"]),
            ],
        }
    }

    /// Look up a built-in theme by identifier.
    pub fn by_id(id: &str) -> Option<Self> {
        match id {
            "classic" => Some(Self::classic()),
            _ => None,
        }
    }

    /// Total number of cards the theme produces (product of attribute arities).
    pub fn card_count(&self) -> usize {
        self.attributes
            .iter()
            .map(|attribute| attribute.values.len())
            .product()
    }
}

/// Generate the full attribute-combination deck for a theme.
///
/// Cards come out in lexicographic tuple order with attribute 0 varying
/// slowest, each wrapped with a sequential id matching its position.
pub fn generate_deck(theme: &Theme) -> Vec<Card> {
    let arities: Vec<usize> = theme
        .attributes
        .iter()
        .map(|attribute| attribute.values.len())
        .collect();
    let total: usize = arities.iter().product();

    let mut cards = Vec::with_capacity(total);
    for id in 0..total {
        let mut properties = [0u8; ATTRIBUTE_COUNT];
        let mut rest = id;
        for slot in (0..ATTRIBUTE_COUNT).rev() {
            properties[slot] = (rest % arities[slot]) as u8;
            rest /= arities[slot];
        }
        cards.push(Card {
            id: id as u32,
            properties,
        });
    }
    cards
}

/// Return a uniformly shuffled copy of `cards`, leaving the input untouched.
pub fn shuffle(cards: &[Card]) -> Vec<Card> {
    let mut shuffled = cards.to_vec();
    let mut rng = rand::rng();
    shuffled.shuffle(&mut rng);
    shuffled
}

/// Check whether three cards form a valid match.
///
/// For every attribute slot the three values must be either all equal or
/// pairwise distinct; a slot with exactly two equal values invalidates the
/// whole triple.
pub fn is_valid_match(a: &Card, b: &Card, c: &Card) -> bool {
    (0..ATTRIBUTE_COUNT).all(|slot| {
        let (x, y, z) = (a.properties[slot], b.properties[slot], c.properties[slot]);
        let all_same = x == y && y == z;
        let all_different = x != y && y != z && x != z;
        all_same || all_different
    })
}
