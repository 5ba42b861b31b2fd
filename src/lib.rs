pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod events;
pub mod scan;
pub mod shake;
pub mod slideshow;
pub mod surface;
pub mod tasks {
    pub mod globe;
}
