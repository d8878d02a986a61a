pub mod nutrition;
pub mod scan;
