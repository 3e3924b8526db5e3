//! Output generation for normalized items and feeds.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── 2024-01-01/
//! │   ├── hello-world.json      # single item
//! │   └── example-com.json      # feed
//! ```

pub mod json;
