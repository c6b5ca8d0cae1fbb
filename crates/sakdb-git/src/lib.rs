//! Git abstraction layer for SakDb.
//!
//! This crate defines the [`GitRepo`] trait — the single interface through
//! which SakDb's namespace backend interacts with git. Nothing outside this
//! crate imports `gix` directly.
//!
//! # Crate layout
//!
//! - [`repo`] — the [`GitRepo`] trait definition, including default
//!   ancestry and tree-editing methods built purely on object read/write.
//! - [`types`] — value types used in trait signatures ([`GitOid`],
//!   [`RefName`], [`TreeEntry`], ...).
//! - [`error`] — the [`GitError`] enum returned by all trait methods.
//! - [`gix_repo`] — the shipped [`GixRepo`] implementation.

pub mod error;
pub mod gix_repo;
mod objects_impl;
mod refs_impl;
pub mod repo;
pub mod types;

pub use error::GitError;
pub use gix_repo::GixRepo;
pub use repo::GitRepo;
pub use types::{CommitInfo, EntryMode, GitOid, RefName, RefNameError, TreeEdit, TreeEntry};
