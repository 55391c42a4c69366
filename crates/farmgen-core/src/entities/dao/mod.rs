pub mod farm;
pub mod history;
pub mod product;

pub use farm::Farm;
pub use history::{HistoryEntry, HistoryKind};
pub use product::{ImageAttempt, NewProduct, Product, ProductPatch, ProductStatus};
