pub mod fs_backend;
pub mod memory_backend;
pub mod registry;
pub mod storage_backend;
