pub mod evaluate;
pub mod lifecycle;
pub mod policy;
pub mod route;
