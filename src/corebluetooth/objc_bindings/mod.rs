pub mod central_delegate_cb;
pub mod central_manager_cb;
mod mac_extensions_cb;
mod mac_utils_cb;
