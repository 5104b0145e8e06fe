//! Locating message files under the emails root.
//!
//! [`resolver::PathResolver`] maps stored relative paths back to files without
//! ever leaving the root; [`walker::Scanner`] enumerates candidate files.

pub mod resolver;
pub mod walker;

pub use resolver::PathResolver;
pub use walker::Scanner;
