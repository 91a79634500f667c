pub mod lsa;
pub mod lsdb;
pub mod messages;
pub mod neighbor;
