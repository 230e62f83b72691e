//! Wire contract shared by the bytewire client and server.
//!
//! The transfer endpoints exchange raw binary bodies plus small JSON
//! envelopes: a [`TransferReceipt`] for upload outcomes and an
//! [`ErrorBody`] for download failures. [`TransferProgress`] is the
//! client-side progress event delivered to callbacks.

pub mod constants;
pub mod types;

pub use types::{ErrorBody, TransferProgress, TransferReceipt};
