pub mod add;
pub mod attach;
pub mod auth_cmd;
pub mod common;
pub mod delete;
pub mod edit;
pub mod list;
pub mod premium;
pub mod search;
pub mod verify_env;
