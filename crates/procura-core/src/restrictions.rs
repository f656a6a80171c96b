//! Restrictions attached to a power delegation.
//!
//! Restrictions limit how a delegated power may be exercised. They are all
//! optional and AND-combined: every restriction on a delegation must permit
//! the exercise for it to proceed.

use serde::{Deserialize, Serialize};

use crate::time::{Timestamp, ValidityWindow};

/// A single restriction on the exercise of a delegated power.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Restriction {
    /// Exercise permitted only inside the window.
    TimeWindow {
        /// Permitted window.
        window: ValidityWindow,
    },

    /// Single-exercise monetary cap.
    AmountLimit {
        /// Maximum permitted amount.
        max_amount: f64,
        /// ISO 4217 currency code the limit is denominated in.
        currency: String,
    },

    /// Exercise permitted only from the listed countries.
    Geographic {
        /// ISO 3166-1 alpha-2 country codes.
        allowed_countries: Vec<String>,
    },
}

/// Context describing an attempted exercise of a delegated power.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExerciseContext {
    /// When the exercise is happening.
    pub at: Timestamp,
    /// Monetary amount involved, if any.
    pub amount: Option<f64>,
    /// Country the exercise originates from, if known.
    pub country: Option<String>,
}

impl Restriction {
    /// Whether this restriction permits the exercise described by `ctx`.
    ///
    /// A restriction whose dimension is absent from the context fails
    /// closed only when it constrains that dimension unconditionally:
    /// a geographic restriction denies an exercise of unknown origin, but
    /// an amount limit permits an exercise with no monetary component.
    pub fn permits(&self, ctx: &ExerciseContext) -> bool {
        match self {
            Self::TimeWindow { window } => window.contains(ctx.at),
            Self::AmountLimit { max_amount, .. } => {
                ctx.amount.map_or(true, |amount| amount <= *max_amount)
            }
            Self::Geographic { allowed_countries } => ctx
                .country
                .as_ref()
                .is_some_and(|country| allowed_countries.iter().any(|c| c == country)),
        }
    }
}

/// Whether every restriction in `restrictions` permits the exercise.
pub fn all_permit(restrictions: &[Restriction], ctx: &ExerciseContext) -> bool {
    restrictions.iter().all(|r| r.permits(ctx))
}
