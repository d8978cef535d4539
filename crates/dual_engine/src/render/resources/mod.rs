//! Renderable resources built on the GPU parameter layer

pub mod materials;
