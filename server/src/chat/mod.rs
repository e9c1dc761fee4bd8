pub mod broadcast;
pub mod membership;
pub mod presence;
