pub mod add;
pub mod comment;
pub mod completions;
pub mod delete;
pub mod done;
pub mod init;
pub mod link;
pub mod list;
pub mod show;
pub mod user;
pub mod vote;
