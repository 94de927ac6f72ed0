pub mod config;
pub mod error;
pub mod events;
pub mod tasks {
    pub mod preload;
    pub mod presenter;
    pub mod rotation;
    pub mod source;
}
