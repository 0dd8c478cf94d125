//! Wire format types for the upstream and caller-facing protocols
//!
//! Each module contains pure serde structs matching the respective JSON
//! format. They are only used at the boundary, never inside the pipeline.

pub mod google;
pub mod openai;
