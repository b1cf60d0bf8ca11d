//! Library scanning and session lifecycle.

pub mod scanner;
pub mod session;

pub use scanner::{FolderLibraryScanner, LibraryScanner};
pub use session::LibrarySession;
