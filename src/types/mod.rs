//! Data types for panel entities.
//!
//! This module contains the core data structures used throughout the library:
//! - Elements and their kinds
//! - Pages and the element registry
//! - Touch input

pub mod element;
pub mod page;
pub mod touch;

pub use element::{Element, ElementKind, STATE_OFF, STATE_ON};
pub use page::{Page, Registry};
pub use touch::{TouchCoordinate, TouchEvent};
