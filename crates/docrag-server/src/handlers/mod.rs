pub mod chat;
pub mod documents;
pub mod ops;
pub mod workspaces;
