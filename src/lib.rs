#![forbid(unsafe_code)]

//! Shared library behind the vidshelf binaries: the catalog data model and
//! stores, the search/listing pipeline, related-video suggestions, admin
//! mutations, announcements and the SEO page rendering.

pub mod announcements;
pub mod catalog;
pub mod config;
pub mod listing;
pub mod metadata;
pub mod related;
pub mod search;
pub mod security;
pub mod seo;
