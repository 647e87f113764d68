//! Multi-Screen Combination
//!
//! Decides what a pair (or group) of screens becomes when an operator asks
//! for `"mirror"`, `"extend"` or `"unique"`, and applies the change.
//!
//! # Components
//!
//! - [`MultiScreenModeChangeManager`] - pairwise state machine over the
//!   current `(inner, external)` combination pair
//! - [`MultiScreenManager`] - operations over any number of screens:
//!   physical/virtual classification, mirror and unique groups, internal
//!   screen power flows and relative positioning
//!
//! # Pairwise transitions
//!
//! The current pair selects the handler; the requested operation selects
//! the target. Only four pairs are legal sources and targets:
//!
//! ```text
//!                 ┌──────────────┐   switch   ┌──────────────┐
//!                 │ Main, Extend │◄──────────►│ Main, Mirror │
//!                 └──────┬───────┘            └──────┬───────┘
//!                   swap │  ╲                 ╱      │ swap
//!                        │    ╲ swap+switch ╱        │
//!                 ┌──────┴───────┐  ╲    ╱  ┌────────┴─────┐
//!                 │ Extend, Main │◄──────────►│ Mirror, Main │
//!                 └──────────────┘   switch   └──────────────┘
//! ```
//!
//! A request whose target equals the current pair is a successful no-op.
//! `"unique"` is never a pairwise target. Transitions are single-hop; an
//! orchestrator that needs two hops issues two requests.
//!
//! # Failure policy
//!
//! Every handler runs inside a change journal. If any collaborator call
//! fails, both sessions and their group membership are restored, composition
//! nodes created during the attempt are destroyed, connection notices
//! already sent are reversed, and the collaborator error is returned as-is.

mod change;
mod manager;
mod mode_change;
mod position;
mod transition;

pub use manager::{MultiScreenManager, ScreenClassification};
pub use mode_change::MultiScreenModeChangeManager;
pub use position::{are_screens_touching, calculate_bounds, ScreenPositionOptions};
pub use transition::{CombinationPair, Handler, OperateType};
