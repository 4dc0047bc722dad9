//! Keel Index - Ordered search and postings lists for the Keel index engine.
//!
//! This crate holds the pure, storage-independent half of secondary indexing:
//!
//! - `search`: binary search in insert mode (`insertion_point`) and exact mode
//!   (`find_exact`), plus `locate`, which scans short lists linearly
//! - `PostingList`: the ascending list of primary keys sharing one indexed value
//!
//! # Example
//!
//! ```rust
//! use keel_core::RowKey;
//! use keel_index::PostingList;
//!
//! let mut postings = PostingList::new();
//! postings.insert(RowKey::Int(7));
//! postings.insert(RowKey::Int(3));
//! postings.insert(RowKey::Int(5));
//! assert_eq!(postings.as_slice(), &[RowKey::Int(3), RowKey::Int(5), RowKey::Int(7)]);
//!
//! postings.remove(&RowKey::Int(5));
//! assert_eq!(postings.as_slice(), &[RowKey::Int(3), RowKey::Int(7)]);
//! ```

#![no_std]

extern crate alloc;

pub mod posting;
pub mod search;

pub use posting::PostingList;
pub use search::{find_exact, insertion_point, locate, LINEAR_SCAN_LIMIT};
