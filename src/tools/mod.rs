pub mod enrollment;
pub mod normalize;
pub mod submissions;
