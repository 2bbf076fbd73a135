/// Generic stream reductions
pub mod reduce;

/// ROFEX acquisition geometry pipeline
pub mod rofex;

/// Random walk segmentation
pub mod segment;
