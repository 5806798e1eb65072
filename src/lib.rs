pub mod actu;
pub mod channels;
pub mod config;
pub mod db;
pub mod feed;
pub mod memento;
pub mod model;
pub mod plugin;
pub mod post_type;
pub mod reconcile;
pub mod render;
pub mod shortcode;
