pub mod card;
pub mod contract;
pub mod recommendation;
