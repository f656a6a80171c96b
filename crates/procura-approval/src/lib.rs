//! Dual-control approval for sensitive actions.
//!
//! Actions matching the configured sensitivity policy need two independent
//! sign-offs, primary then secondary, from distinct identities before they
//! may proceed. Requests expire if the second sign-off does not arrive
//! before the deadline, and every state change lands in the audit ledger.

pub mod gate;

pub use gate::DualControlGate;
