pub mod handlers;
pub mod inbox_access;
pub mod password;
pub mod session;
pub mod tokens;
