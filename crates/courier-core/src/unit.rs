use std::fmt;

use serde::{Deserialize, Serialize};

/// The "no meaningful result" value.
///
/// Handlers that return nothing (`()`) are normalized to `Unit` so that every
/// pipeline has a concrete response type. `mediator.execute(cmd)` is
/// `mediator.send::<Unit, _>(cmd)` with the value discarded.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Unit;

impl From<()> for Unit {
    fn from(_: ()) -> Self {
        Unit
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("()")
    }
}
