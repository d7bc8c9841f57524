//! Type system utilities and aliases.
//!
//! - [`aliases`]: shared-state aliases (`Arc<Mutex<T>>`, `Arc<RwLock<T>>`)

pub mod aliases;

pub use aliases::*;
