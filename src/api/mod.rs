pub mod central;
pub mod central_event;
pub mod device;
