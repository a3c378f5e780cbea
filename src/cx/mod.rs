//! Task contexts, scopes, and join handles.

#[allow(clippy::module_inception)]
mod cx;
mod scope;

pub use cx::{Cx, Shield, YieldNow};
pub use scope::{Join, JoinHandle, Scope};

pub(crate) use cx::CancelCell;
