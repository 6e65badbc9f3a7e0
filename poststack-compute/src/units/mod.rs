//! Concrete handler units

mod post;
mod posts;

pub use post::PostUnit;
pub use posts::PostsUnit;
