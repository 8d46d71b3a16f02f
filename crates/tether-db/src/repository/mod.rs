//! # Repository Module
//!
//! Database repository implementations for Tether.
//!
//! ```text
//! LocalDocumentStore (tether-sync)
//!      │
//!      │  db.documents().set("users", id, fields, merge)
//!      ▼
//! DocumentRepository
//! ├── get / list / find_by_field / count
//! ├── set (replace or deep merge)
//! ├── patch_field
//! └── delete
//!      │
//!      ▼
//! SQLite `documents` table
//! ```

pub mod document;
