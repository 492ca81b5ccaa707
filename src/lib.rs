//! Catalink: link scanned museum object images to catalogue records
//!
//! Inventory numbers are parsed from spreadsheet exports, matched against
//! image filenames in year-partitioned directories, and optionally turned
//! into object descriptions by a vision/language API.

pub mod cli;
pub mod core;
