pub mod annotator;
pub mod coords;
pub mod marker_resolver;
pub mod screenshot;
pub mod stability;
pub mod traits;
pub mod types;
pub mod vlm_ocr;
