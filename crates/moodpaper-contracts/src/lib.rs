pub mod chat;
pub mod events;
pub mod storage;
pub mod wallpapers;
