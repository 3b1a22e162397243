//! Core engine of a concentrated liquidity AMM pool.
//!
//! A [`Pool`](states::Pool) holds two token reserves and lets liquidity
//! providers deposit into arbitrary price ranges, traders exchange one token
//! for the other along a piecewise-constant-liquidity curve, and anyone
//! borrow the reserves within a single call via flash loans. A ring-buffer
//! oracle records time-weighted accumulators on the way.
//!
//! The crate is host agnostic: token custody, payment callbacks and the
//! clock are supplied by the caller through the
//! [`TokenLedger`](states::TokenLedger) and [`Payer`](states::Payer) traits
//! and explicit timestamps. Prices are Q64.96 square roots, fee growth is
//! Q128.128, and every operation either completes or leaves the pool
//! untouched.

pub mod error;
pub mod libraries;
pub mod states;

pub use error::ErrorCode;
pub use states::{Payer, Pool, PoolConfig, SwapResult, TokenLedger};

#[cfg(test)]
mod test_utilities;
#[cfg(test)]
mod tests;
