//! C4 — configuration load, merge, and validation over the §3/§6.3
//! declarative `Config` grammar defined in `task-core`.

pub mod cycle;
pub mod defaults;
pub mod load;
pub mod validate;

pub use load::{load, load_and_eval};
pub use validate::validate;
