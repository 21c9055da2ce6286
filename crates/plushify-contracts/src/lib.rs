pub mod commands;
pub mod events;
pub mod locale;
pub mod media;
pub mod transform;
pub mod workspace;
