pub mod attendance;
pub mod presence;
