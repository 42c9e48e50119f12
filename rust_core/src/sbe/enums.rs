//! Closed wire enums of the Deribit multicast schema.
//!
//! Each enum is a `u8` on the wire. Values outside the declared set decode
//! to `DecodeError::OutOfRange` rather than a catch-all variant.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($variant:ident = $value:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn from_wire(value: u8) -> Result<Self, DecodeError> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(DecodeError::OutOfRange {
                        field: $field,
                        value: other as u64,
                    }),
                }
            }

            pub fn to_wire(self) -> u8 {
                match self {
                    $($name::$variant => $value),+
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Inverse of `as_str`, used for REST payloads.
            pub fn from_label(label: &str) -> Option<Self> {
                match label {
                    $($label => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Lifecycle state of an instrument.
    InstrumentState, "instrument_state" {
        Created = 0 => "created",
        Open = 1 => "open",
        Closed = 2 => "closed",
        Settled = 3 => "settled",
    }
}

impl InstrumentState {
    /// Closed instruments are the only inactive ones.
    pub fn is_active(&self) -> bool {
        !matches!(self, InstrumentState::Closed)
    }
}

wire_enum! {
    InstrumentKind, "instrument_kind" {
        Future = 0 => "future",
        Option = 1 => "option",
        FutureCombo = 2 => "future_combo",
        OptionCombo = 3 => "option_combo",
    }
}

wire_enum! {
    /// Future settlement style; options carry `NotApplicable`.
    InstrumentType, "instrument_type" {
        NotApplicable = 0 => "not_applicable",
        Reversed = 1 => "reversed",
        Linear = 2 => "linear",
    }
}

wire_enum! {
    OptionType, "option_type" {
        NotApplicable = 0 => "not_applicable",
        Call = 1 => "call",
        Put = 2 => "put",
    }
}

wire_enum! {
    SettlementPeriod, "settlement_period" {
        Perpetual = 0 => "perpetual",
        Minute = 1 => "minute",
        Hour = 2 => "hour",
        Day = 3 => "day",
        Week = 4 => "week",
        Month = 5 => "month",
    }
}

wire_enum! {
    BookSide, "book_side" {
        Ask = 0 => "ask",
        Bid = 1 => "bid",
    }
}

wire_enum! {
    /// What happened to a price level.
    BookAction, "book_change" {
        New = 0 => "new",
        Change = 1 => "change",
        Delete = 2 => "delete",
    }
}

wire_enum! {
    Direction, "direction" {
        Buy = 0 => "buy",
        Sell = 1 => "sell",
    }
}

wire_enum! {
    TickDirection, "tick_direction" {
        Plus = 0 => "plus",
        ZeroPlus = 1 => "zero_plus",
        Minus = 2 => "minus",
        ZeroMinus = 3 => "zero_minus",
    }
}

wire_enum! {
    Liquidation, "liquidation" {
        None = 0 => "none",
        Maker = 1 => "maker",
        Taker = 2 => "taker",
        Both = 3 => "both",
    }
}

pub(crate) fn bool_from_wire(field: &'static str, value: u8) -> Result<bool, DecodeError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DecodeError::OutOfRange {
            field,
            value: other as u64,
        }),
    }
}
