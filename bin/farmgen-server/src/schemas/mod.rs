pub mod farm;
pub mod product;
