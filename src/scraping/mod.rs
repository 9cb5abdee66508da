pub mod browser_manager;
pub mod extract;
pub mod session;
