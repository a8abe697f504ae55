pub mod storage;
pub mod transformer;
