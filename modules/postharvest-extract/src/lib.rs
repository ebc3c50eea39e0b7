//! Extraction side of the harvest pipeline.
//!
//! Everything here is synchronous and works over any tree that implements
//! [`DocumentNode`]. [`DomTree`] is the owned implementation built from HTML.

pub mod dom;
pub mod extractor;
pub mod identity;
pub mod locator;
pub mod normalize;
pub mod rules;
pub mod tree;

pub use dom::DocumentNode;
pub use extractor::{extract_record, find_expansion_controls, is_video_page_href, normalize_permalink};
pub use identity::{detect_viewer_name, IdentitySource};
pub use locator::{find_container, is_large_wrapper, LARGE_WRAPPER_CHILDREN, MAX_ANCESTOR_DEPTH};
pub use normalize::{clean_text, collect_text, normalize_container, redact_viewer_name, MAX_TEXT_CHARS, TRIMMED_MARKER};
pub use tree::{DomNode, DomTree};
