//! Files written by a run.
//!
//! # Submodules
//!
//! - [`snapshot`]: raw scrape snapshot and the change gate in front of normalization
//! - [`json`]: validated publication of the canonical document
//!
//! # Output Structure
//!
//! ```text
//! json/
//! ├── scraped.json     # raw scrape of the last changed run (snapshot)
//! └── formatted.json   # canonical document read by consumers
//! ```
//!
//! Both files are only ever replaced atomically, so a reader in another
//! process never sees a partially written file.

pub mod json;
pub mod snapshot;
