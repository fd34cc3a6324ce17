//! Scene lifecycle scenarios against the headless backend

mod lifecycle;
mod resources;
