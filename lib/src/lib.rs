//! Reader and writer for JVM class files
//!
//! See [`jvm`] for the visitor based API.

pub mod jvm;
pub mod util;
