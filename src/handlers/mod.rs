pub mod auth;
pub mod chats;
pub mod files;
pub mod health;
pub mod invites;
pub mod messages;
pub mod settings;
pub mod stickers;
pub mod users;
