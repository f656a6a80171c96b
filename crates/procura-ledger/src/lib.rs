//! Append-only, hash-chained audit ledger.
//!
//! Every decision made by the Procura components lands here as an
//! [`procura_core::AuditEntry`]. Entries on the same chain key are linked by
//! hash: each entry's `self_hash` covers its core fields plus the previous
//! entry's `self_hash`, so altering any stored field breaks every later
//! link. [`AuditLedger::verify_chain`] re-walks a chain and reports the
//! first broken index.

pub mod filter;
pub mod ledger;

pub use filter::AuditFilter;
pub use ledger::{AuditLedger, ChainVerification};
