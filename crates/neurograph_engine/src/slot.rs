// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection-point roles for wire endpoints.
//!
//! A wire endpoint is always a node plus a [`Slot`]. The slot says which part of
//! the node the wire attaches to: the default data address, the dedicated bias
//! input of a threshold unit, a single pixel cell, a flat tensor element, or one
//! of the two group-level macro slots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attachment point on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Slot {
    /// Default data address (scalar value or element 0)
    #[default]
    Plain,
    /// Threshold input of a threshold unit
    Bias,
    /// A single pixel-grid cell by flat index
    Cell(usize),
    /// A single tensor element by flat index
    Element(usize),
    /// Group-level source slot used by macro connections
    GroupOut,
    /// Group-level target slot used by macro connections
    GroupIn,
}

impl Slot {
    /// Flat element address carried by this slot, if any
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Cell(i) | Self::Element(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether this is one of the reserved group slots
    pub fn is_group_slot(&self) -> bool {
        matches!(self, Self::GroupOut | Self::GroupIn)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "input"),
            Self::Bias => write!(f, "bias"),
            Self::Cell(i) => write!(f, "cell-{i}"),
            Self::Element(i) => write!(f, "element-{i}"),
            Self::GroupOut => write!(f, "group-out"),
            Self::GroupIn => write!(f, "group-in"),
        }
    }
}

/// Error parsing a slot name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown slot: {0}")]
pub struct ParseSlotError(pub String);

impl FromStr for Slot {
    type Err = ParseSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_index = |rest: &str| {
            rest.parse::<usize>()
                .map_err(|_| ParseSlotError(s.to_string()))
        };

        match s {
            "" | "input" => Ok(Self::Plain),
            "bias" => Ok(Self::Bias),
            "group-out" => Ok(Self::GroupOut),
            "group-in" => Ok(Self::GroupIn),
            _ => {
                if let Some(rest) = s.strip_prefix("cell-") {
                    parse_index(rest).map(Self::Cell)
                } else if let Some(rest) = s.strip_prefix("element-") {
                    parse_index(rest).map(Self::Element)
                } else {
                    Err(ParseSlotError(s.to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_names() {
        for slot in [
            Slot::Plain,
            Slot::Bias,
            Slot::Cell(12),
            Slot::Element(3),
            Slot::GroupOut,
            Slot::GroupIn,
        ] {
            assert_eq!(slot.to_string().parse::<Slot>(), Ok(slot));
        }
    }

    #[test]
    fn test_slot_rejects_garbage() {
        assert!("cell-x".parse::<Slot>().is_err());
        assert!("pixel-in-3".parse::<Slot>().is_err());
        assert_eq!("".parse::<Slot>(), Ok(Slot::Plain));
    }

    #[test]
    fn test_slot_index() {
        assert_eq!(Slot::Cell(4).index(), Some(4));
        assert_eq!(Slot::Element(0).index(), Some(0));
        assert_eq!(Slot::Bias.index(), None);
        assert!(Slot::GroupIn.is_group_slot());
    }
}
