//! Valuation errors
//!
//! A valuation either returns a complete, validated result or one of these.
//! There is no partial output mode.

use alloy_primitives::Address;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ValuationError>;

#[derive(Error, Debug)]
pub enum ValuationError {
    /// A portfolio token had zero successful quotes after the batch fetch
    #[error("No route found for {symbol} ({token:?}): all {routes_tried} candidate routes failed")]
    NoRouteFound {
        token: Address,
        symbol: String,
        routes_tried: usize,
    },

    /// The chain client cannot batch calls and sequential fallback is not implemented
    #[error("Chain client does not support batched calls; sequential quoting is not implemented")]
    BatchingUnsupported,

    /// RPC timeout, connection error or node-side failure
    #[error("RPC transport failed: {0}")]
    Transport(String),

    /// Malformed on-chain response
    #[error("Failed to decode {context}: {reason}")]
    Decode { context: String, reason: String },

    /// Raw <-> decimal amount conversion out of range
    #[error("Amount conversion failed: {0}")]
    Conversion(String),

    #[error("Negative balance {amount} for token {token:?}")]
    NegativeBalance { token: Address, amount: Decimal },

    #[error("Token details unavailable for {0:?}")]
    UnknownToken(Address),
}

impl ValuationError {
    pub fn decode(context: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ValuationError::Decode {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_no_route(&self) -> bool {
        matches!(self, ValuationError::NoRouteFound { .. })
    }
}
