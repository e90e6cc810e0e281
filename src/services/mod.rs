pub mod batch_service;
pub mod existence;
pub mod link_issuer;
pub mod resolver;
pub mod storage_service;
