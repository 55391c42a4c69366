//! Content-generation adapters, CSV import and the product workflow.

pub mod image;
pub mod image_pipeline;
pub mod import;
pub mod locks;
pub mod storage;
pub mod text;
pub mod workflow;

pub use image::{ImageBatch, ImageGenerator, KeyLayout, ProductType, ReplicateImageGenerator};
pub use image_pipeline::{HttpImageFetcher, ImageFetcher, ImagePipeline};
pub use import::{import_csv, import_csv_file, ImportReport};
pub use locks::ProductLocks;
pub use storage::{ObjectStore, SpacesObjectStore};
pub use text::{Classification, Descriptions, OpenAiTextGenerator, TextGenerator};
pub use workflow::{ProductWorkflow, ReviewSubmission};
