//! Error catalog for Vigil.
//!
//! Every failure that can end up in a health report or a daemon log carries a
//! stable `VGL-Exxx` code from the catalog, with remediation steps.
//!
//! # Error Code Ranges
//!
//! | Range      | Category       | Description                              |
//! |------------|----------------|------------------------------------------|
//! | E001-E099  | Config         | Configuration file and environment       |
//! | E100-E199  | Probe          | Backend probe transport failures         |
//! | E200-E299  | Store          | Session store access                     |
//! | E300-E399  | Classification | Snapshots the classifier cannot map      |
//! | E500-E599  | Internal       | Internal/unexpected errors               |

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};
