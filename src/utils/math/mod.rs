pub mod matrix;
pub mod vector;

pub use matrix::RowMatrix;
