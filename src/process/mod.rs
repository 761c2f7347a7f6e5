pub mod chain;
pub mod flatten;
pub mod ghostscript;
pub mod qpdf;
pub mod tools;
