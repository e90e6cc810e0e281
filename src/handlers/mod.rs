pub mod batch_handlers;
pub mod health_handlers;
pub mod lfs_json;
pub mod transfer_handlers;
